use std::collections::HashSet;

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use crate::model::Command;

pub trait LabelMatcher {
    fn find(&self, query: &str, labels: &[&str]) -> Vec<String>;
}

pub struct SkimLabelMatcher {
    matcher: SkimMatcherV2,
}

impl Default for SkimLabelMatcher {
    fn default() -> Self {
        Self {
            matcher: SkimMatcherV2::default(),
        }
    }
}

impl LabelMatcher for SkimLabelMatcher {
    fn find(&self, query: &str, labels: &[&str]) -> Vec<String> {
        if query.is_empty() {
            return labels.iter().map(|label| label.to_string()).collect();
        }

        let mut scored: Vec<(i64, usize, &str)> = labels
            .iter()
            .enumerate()
            .filter_map(|(index, label)| {
                self.matcher
                    .fuzzy_match(label, query)
                    .map(|score| (score, index, *label))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored
            .into_iter()
            .map(|(_, _, label)| label.to_string())
            .collect()
    }
}

/// Indices of the commands visible for `query`, in configuration order.
///
/// The matcher only decides membership; its ranking is thrown away so the list
/// never reshuffles while typing.
pub fn project(matcher: &dyn LabelMatcher, query: &str, commands: &[Command]) -> Vec<usize> {
    let labels: Vec<&str> = commands.iter().map(|command| command.label.as_str()).collect();
    let matched: HashSet<String> = matcher.find(query, &labels).into_iter().collect();

    commands
        .iter()
        .enumerate()
        .filter(|(_, command)| matched.contains(&command.label))
        .map(|(index, _)| index)
        .collect()
}
