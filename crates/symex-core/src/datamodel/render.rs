//! `#ifdef` text rendering of the conditional output tree

use super::node::{Alternative, DataNode};
use crate::condition::Condition;
use crate::control::ControlSignal;

/// Render a node as text annotated with `#ifdef`/`#elif`/`#else`/`#endif`
pub fn render_ifdef(node: &DataNode) -> String {
    let mut writer = IfdefWriter::default();
    writer.node(node);
    writer.out
}

#[derive(Default)]
struct IfdefWriter {
    out: String,
    /// A marker line was just written and still needs its line break
    pending_newline: bool,
}

impl IfdefWriter {
    fn text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.pending_newline {
            self.out.push('\n');
            self.pending_newline = false;
        }
        self.out.push_str(text);
    }

    fn marker(&mut self, marker: &str) {
        if self.pending_newline || (!self.out.is_empty() && !self.out.ends_with('\n')) {
            self.out.push('\n');
        }
        self.out.push_str(marker);
        self.pending_newline = true;
    }

    fn node(&mut self, node: &DataNode) {
        match node {
            DataNode::Concrete(lit) => self.text(&lit.to_php_string()),
            DataNode::Symbolic(description) => self.text(&format!("{{{{{}}}}}", description)),
            DataNode::Concat(parts) => {
                for part in parts {
                    self.node(part);
                }
            }
            DataNode::Conditional(alternatives) => self.conditional(alternatives),
            DataNode::Control(ControlSignal::Ok) | DataNode::Unset => {}
            DataNode::Control(signal) => self.marker(&format!("#pragma {}", signal)),
            DataNode::Approximate(reason) => self.marker(&format!("#pragma approximate {}", reason)),
        }
    }

    fn conditional(&mut self, alternatives: &[Alternative]) {
        // The last alternative is an `#else` when the guards cover every input
        let exhaustive =
            Condition::or_all(alternatives.iter().map(|alt| alt.condition.clone())).is_true();
        let last = alternatives.len().saturating_sub(1);

        for (i, alt) in alternatives.iter().enumerate() {
            let marker = if i == 0 {
                format!("#ifdef {}", alt.condition)
            } else if i == last && exhaustive {
                "#else".to_string()
            } else {
                format!("#elif {}", alt.condition)
            };
            self.marker(&marker);
            self.node(&alt.node);
        }
        self.marker("#endif");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(name: &str) -> Condition {
        Condition::atom(name)
    }

    #[test]
    fn test_if_else() {
        let node = DataNode::merge(vec![
            (cond("cond"), DataNode::string("A")),
            (Condition::not(cond("cond")), DataNode::string("B")),
        ]);
        assert_eq!(render_ifdef(&node), "#ifdef cond\nA\n#else\nB\n#endif");
    }

    #[test]
    fn test_text_around_markers() {
        let node = DataNode::concat(vec![
            DataNode::string("<p>"),
            DataNode::merge(vec![
                (cond("a"), DataNode::string("yes\n")),
                (cond("b"), DataNode::string("maybe")),
            ]),
            DataNode::string("</p>"),
        ]);
        assert_eq!(
            render_ifdef(&node),
            "<p>\n#ifdef a\nyes\n#elif b\nmaybe\n#endif\n</p>"
        );
    }

    #[test]
    fn test_elseif_chain_ends_in_else() {
        let a = cond("a");
        let b = cond("b");
        let node = DataNode::merge(vec![
            (a.clone(), DataNode::string("1")),
            (Condition::and(Condition::not(a.clone()), b.clone()), DataNode::string("2")),
            (
                Condition::and(Condition::not(a), Condition::not(b)),
                DataNode::string("3"),
            ),
        ]);
        assert_eq!(
            render_ifdef(&node),
            "#ifdef a\n1\n#elif !a && b\n2\n#else\n3\n#endif"
        );
    }

    #[test]
    fn test_nested_and_special_nodes() {
        let inner = DataNode::merge(vec![
            (cond("b"), DataNode::symbolic("$_GET['x']")),
            (Condition::not(cond("b")), DataNode::Approximate("loop bound".to_string())),
        ]);
        let node = DataNode::merge(vec![
            (cond("a"), inner),
            (Condition::not(cond("a")), DataNode::Control(ControlSignal::Exit)),
        ]);
        assert_eq!(
            render_ifdef(&node),
            "#ifdef a\n#ifdef b\n{{$_GET['x']}}\n#else\n#pragma approximate loop bound\n#endif\n#else\n#pragma exit\n#endif"
        );
    }

    #[test]
    fn test_empty_alternative() {
        let node = DataNode::merge(vec![
            (cond("cond"), DataNode::string("")),
            (Condition::not(cond("cond")), DataNode::string("X")),
        ]);
        assert_eq!(render_ifdef(&node), "#ifdef cond\n#else\nX\n#endif");
    }
}
