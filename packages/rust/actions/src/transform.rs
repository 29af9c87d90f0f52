//! Pure transformations over action configurations.
//!
//! None of these mutate their input: each returns a new [`ActionConfig`].

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::schema::{Action, ActionConfig};

/// Type that merged configurations narrow variables to.
pub const NARROW_TYPE: &str = "float";

/// Separator between components of a fully qualified variable name.
const NAMESPACE_SEPARATOR: &str = "::";

/// Drop actions whose unqualified name is in `names`.
///
/// Only the last `::` component is compared, so `sum` matches `::main::sum`.
/// Actions without a name are kept.
pub fn filter_by_name<S: AsRef<str>>(config: &ActionConfig, names: &[S]) -> ActionConfig {
    let ignored: HashSet<&str> = names.iter().map(AsRef::as_ref).collect();
    let kept: Vec<Action> = config
        .actions
        .iter()
        .filter(|action| match action.name() {
            Some(name) => !ignored.contains(unqualified(name)),
            None => true,
        })
        .cloned()
        .collect();

    debug!(
        removed = config.actions.len() - kept.len(),
        "filtered actions by name"
    );
    config.with_actions(kept)
}

/// Drop actions at the given zero-based positions. Out-of-range indices are ignored.
pub fn filter_by_index(config: &ActionConfig, indices: &BTreeSet<usize>) -> ActionConfig {
    let kept: Vec<Action> = config
        .actions
        .iter()
        .enumerate()
        .filter(|(i, _)| !indices.contains(i))
        .map(|(_, action)| action.clone())
        .collect();

    debug!(
        removed = config.actions.len() - kept.len(),
        "filtered actions by index"
    );
    config.with_actions(kept)
}

/// Union of every narrowing variable change across `configs`.
///
/// Keeps `change_var_basetype` actions whose `to_type` is [`NARROW_TYPE`] and
/// that carry a `uid`; the first action seen per uid wins. The result is sorted
/// by uid.
pub fn merge_dedupe_sort(configs: &[ActionConfig]) -> ActionConfig {
    let mut seen = HashSet::new();
    let mut merged: Vec<Action> = Vec::new();

    for action in configs.iter().flat_map(|cfg| cfg.actions.iter()) {
        let Action::ChangeVarBasetype(change) = action else {
            continue;
        };
        if change.to_type != NARROW_TYPE {
            continue;
        }
        let Some(uid) = &change.uid else {
            continue;
        };
        if seen.insert(uid.clone()) {
            merged.push(action.clone());
        }
    }

    // stable: equal ordinals keep first-seen order
    merged.sort_by_key(|action| action.uid().map(|uid| uid.ordinal()).unwrap_or_default());

    debug!(inputs = configs.len(), merged = merged.len(), "merged configurations");
    ActionConfig::new(merged)
}

/// Every action, across all inputs, whose labels include `label`.
pub fn extract_by_label(configs: &[ActionConfig], label: &str) -> ActionConfig {
    let actions: Vec<Action> = configs
        .iter()
        .flat_map(|cfg| cfg.actions.iter())
        .filter(|action| {
            action
                .labels()
                .is_some_and(|labels| labels.contains(&label))
        })
        .cloned()
        .collect();

    ActionConfig::new(actions)
}

fn unqualified(name: &str) -> &str {
    name.rsplit(NAMESPACE_SEPARATOR).next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParseMode;

    fn config(text: &str) -> ActionConfig {
        ActionConfig::parse_str(text, ParseMode::Strict).expect("parse fixture")
    }

    fn var(name: &str, uid: i64, to_type: &str, labels: &[&str]) -> String {
        let labels: Vec<String> = labels.iter().map(|l| format!("\"{l}\"")).collect();
        format!(
            r#"{{ "action": "change_var_basetype", "name": "{name}", "scope": "main",
                 "from_type": "double", "to_type": "{to_type}", "uid": {uid},
                 "labels": [{}] }}"#,
            labels.join(",")
        )
    }

    fn doc(actions: &[String]) -> ActionConfig {
        config(&format!(
            r#"{{ "version": "1", "tool_id": "TypeForge", "actions": [{}] }}"#,
            actions.join(",")
        ))
    }

    #[test]
    fn filter_by_name_matches_last_component() {
        let cfg = doc(&[
            var("::main::sum", 1, "float", &[]),
            var("::main::err", 2, "float", &[]),
            var("::err::total", 3, "float", &[]),
        ]);
        let out = filter_by_name(&cfg, &["err"]);
        let names: Vec<_> = out.actions.iter().filter_map(Action::name).collect();
        assert_eq!(names, vec!["::main::sum", "::err::total"]);
        assert_eq!(cfg.actions.len(), 3, "input must be left untouched");
    }

    #[test]
    fn filter_by_index_keeps_the_rest_in_order() {
        let cfg = doc(&[
            var("a", 1, "float", &[]),
            var("b", 2, "float", &[]),
            var("c", 3, "float", &[]),
        ]);
        let out = filter_by_index(&cfg, &BTreeSet::from([0, 2]));
        assert_eq!(out.actions.len(), 1);
        assert_eq!(out.actions[0], cfg.actions[1]);
        assert_eq!(out.tool_id, "TypeForge");
    }

    #[test]
    fn merge_dedupes_and_sorts_by_uid() {
        let first = doc(&[
            var("c", 30, "float", &[]),
            var("a", 10, "float", &[]),
            var("skip", 5, "double", &[]),
        ]);
        let second = doc(&[
            var("a-again", 10, "float", &[]),
            var("b", 20, "float", &[]),
            r#"{ "action": "replace_pragma", "from_type": "x", "to_type": "y" }"#.to_string(),
        ]);

        let merged = merge_dedupe_sort(&[first, second]);
        let uids: Vec<i64> = merged
            .actions
            .iter()
            .filter_map(|a| a.uid().map(|u| u.ordinal()))
            .collect();
        assert_eq!(uids, vec![10, 20, 30]);
        assert_eq!(merged.actions[0].name(), Some("a"), "first occurrence wins");
        assert_eq!(merged.tool_id, "FloatSmith");
    }

    #[test]
    fn merge_output_has_strictly_ascending_unique_uids() {
        let inputs: Vec<ActionConfig> = (0..4)
            .map(|k| {
                doc(&(0..6)
                    .map(|i| var("v", (i * 7 + k * 3) % 11, "float", &[]))
                    .collect::<Vec<_>>())
            })
            .collect();
        let merged = merge_dedupe_sort(&inputs);
        let uids: Vec<i64> = merged
            .actions
            .iter()
            .filter_map(|a| a.uid().map(|u| u.ordinal()))
            .collect();
        assert!(uids.windows(2).all(|w| w[0] < w[1]), "{uids:?}");
    }

    #[test]
    fn extract_by_label_is_idempotent() {
        let a = doc(&[
            var("x", 1, "float", &["typechain:1"]),
            var("y", 2, "float", &["typechain:2"]),
        ]);
        let b = doc(&[var("z", 3, "float", &["typechain:1", "typechain:3"])]);

        let once = extract_by_label(&[a.clone(), b.clone()], "typechain:1");
        let twice = extract_by_label(&[a, b], "typechain:1");
        assert_eq!(once.actions.len(), 2);
        assert_eq!(
            once.to_pretty_json().expect("encode"),
            twice.to_pretty_json().expect("encode")
        );

        let again = extract_by_label(&[once.clone()], "typechain:1");
        assert_eq!(again.actions, once.actions);
    }

    #[test]
    fn extract_by_label_covers_every_action_kind() {
        let cfg = doc(&[
            r#"{ "action": "change_every_basetype", "scope": "main", "from_type": "double",
                 "to_type": "float", "labels": ["L"] }"#
                .to_string(),
            r#"{ "action": "custom_kind", "name": "k", "labels": ["L"] }"#.to_string(),
            r#"{ "action": "add_include", "name": "adapt.h", "labels": ["other"] }"#.to_string(),
            var("v", 1, "float", &["L"]),
        ]);
        let out = extract_by_label(&[cfg], "L");
        let kinds: Vec<&str> = out.actions.iter().map(Action::kind).collect();
        assert_eq!(
            kinds,
            vec!["change_every_basetype", "custom_kind", "change_var_basetype"]
        );
    }
}
