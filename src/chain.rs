use crate::pane::PaneId;

/// When `source` finishes a command, type `command` into `target`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainRule {
    pub id: u32,
    pub source: PaneId,
    pub target: PaneId,
    pub command: String,
    /// Remove the rule after it fires once.
    pub once: bool,
}

#[derive(Default)]
pub struct ChainRules {
    rules: Vec<ChainRule>,
    next_id: u32,
}

impl ChainRules {
    pub fn new() -> Self {
        ChainRules::default()
    }

    pub fn add(&mut self, source: PaneId, target: PaneId, command: String, once: bool) -> u32 {
        self.next_id += 1;
        let id = self.next_id;
        self.rules.push(ChainRule { id, source, target, command, once });
        id
    }

    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        self.rules.len() != before
    }

    pub fn rules(&self) -> &[ChainRule] {
        &self.rules
    }

    /// Rules triggered by a completion in `source`, as `(target, command)`.
    /// One-shot rules are consumed.
    pub fn fire(&mut self, source: PaneId) -> Vec<(PaneId, String)> {
        let fired = self
            .rules
            .iter()
            .filter(|r| r.source == source)
            .map(|r| (r.target, r.command.clone()))
            .collect();
        self.rules.retain(|r| !(r.source == source && r.once));
        fired
    }

    /// Drop every rule with `pane` at either end.
    pub fn forget_pane(&mut self, pane: PaneId) {
        self.rules.retain(|r| r.source != pane && r.target != pane);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_once_rules_are_consumed() {
        let mut chains = ChainRules::new();
        chains.add(1, 2, "make deploy".into(), true);
        chains.add(1, 3, "notify-send done".into(), false);
        assert_eq!(
            chains.fire(1),
            vec![(2, "make deploy".to_string()), (3, "notify-send done".to_string())]
        );
        assert_eq!(chains.fire(1), vec![(3, "notify-send done".to_string())]);
        assert!(chains.fire(2).is_empty());
    }

    #[test]
    fn test_forget_pane_drops_both_ends() {
        let mut chains = ChainRules::new();
        chains.add(1, 2, "a".into(), false);
        chains.add(2, 3, "b".into(), false);
        let keep = chains.add(3, 1, "c".into(), false);
        chains.forget_pane(2);
        assert_eq!(chains.rules().len(), 1);
        assert_eq!(chains.rules()[0].id, keep);
    }

    #[test]
    fn test_remove_by_id() {
        let mut chains = ChainRules::new();
        let id = chains.add(1, 2, "a".into(), false);
        assert!(chains.remove(id));
        assert!(!chains.remove(id));
        assert!(chains.rules().is_empty());
    }
}
