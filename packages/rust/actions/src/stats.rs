//! Label clustering and cast statistics over sets of configurations.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use floatsmith_shared::{FloatSmithError, Result};

use crate::schema::ActionConfig;

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Label usage across a set of configurations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LabelStatistics {
    /// Label-set size → number of actions carrying that many labels.
    pub label_set_sizes: BTreeMap<usize, usize>,
    /// Label → identifiers of the actions carrying it.
    pub per_label: BTreeMap<String, Vec<String>>,
    /// Group id → identifiers of its actions. Ids start at 1 in first-seen order.
    pub groups: BTreeMap<usize, Vec<String>>,
}

impl LabelStatistics {
    /// Compute statistics over every labelled action in `configs`, in order.
    ///
    /// Two actions belong to the same group when their label sets intersect,
    /// directly or through a chain of other actions. An action that links
    /// two existing groups merges them into the earlier one.
    pub fn compute(configs: &[ActionConfig]) -> Self {
        let mut stats = Self::default();

        let mut parent: Vec<usize> = Vec::new();
        let mut label_group: HashMap<&str, usize> = HashMap::new();
        let mut members: Vec<(usize, String)> = Vec::new();

        for action in configs.iter().flat_map(|cfg| cfg.actions.iter()) {
            let Some(labels) = action.labels() else {
                continue;
            };
            let id = action.identifier();

            *stats.label_set_sizes.entry(labels.len()).or_default() += 1;
            for label in &labels {
                stats
                    .per_label
                    .entry(label.to_string())
                    .or_default()
                    .push(id.clone());
            }

            let linked: Vec<usize> = labels
                .iter()
                .filter_map(|l| label_group.get(l).copied())
                .map(|g| find_root(&mut parent, g))
                .collect();
            let group = match linked.iter().min() {
                Some(&g) => g,
                None => {
                    parent.push(parent.len());
                    parent.len() - 1
                }
            };
            for root in linked {
                parent[root] = group;
            }
            for label in labels {
                label_group.insert(label, group);
            }
            members.push((group, id));
        }

        // Roots are the smallest id of each merged set, so ascending root order
        // is first-seen order.
        let mut by_root: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (group, id) in members {
            let root = find_root(&mut parent, group);
            by_root.entry(root).or_default().push(id);
        }
        stats.groups = by_root
            .into_values()
            .enumerate()
            .map(|(i, ids)| (i + 1, ids))
            .collect();

        stats
    }

    /// Groups with more than one member.
    pub fn linked_groups(&self) -> impl Iterator<Item = (&usize, &Vec<String>)> {
        self.groups.iter().filter(|(_, ids)| ids.len() > 1)
    }
}

fn find_root(parent: &mut [usize], mut node: usize) -> usize {
    while parent[node] != node {
        parent[node] = parent[parent[node]];
        node = parent[node];
    }
    node
}

// ---------------------------------------------------------------------------
// Casts
// ---------------------------------------------------------------------------

/// Summary of `craft_attrs.new_casts` over a set of configurations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CastStatistics {
    pub count: usize,
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    /// Element at position `count / 2` of the sorted sample (no interpolation).
    pub median: i64,
    /// Sample standard deviation (n − 1 denominator).
    pub stddev: f64,
}

impl CastStatistics {
    /// Statistics over every configuration that records `new_casts`.
    pub fn compute(configs: &[ActionConfig]) -> Result<Self> {
        Self::from_samples(configs.iter().filter_map(ActionConfig::new_casts).collect())
    }

    /// Statistics over raw cast counts. Needs at least two samples.
    pub fn from_samples(mut casts: Vec<i64>) -> Result<Self> {
        let count = casts.len();
        if count < 2 {
            return Err(FloatSmithError::DegenerateStatistics { count });
        }
        casts.sort_unstable();

        let sum: i128 = casts.iter().map(|&x| i128::from(x)).sum();
        let mean = sum as f64 / count as f64;
        let variance = casts
            .iter()
            .map(|&x| (x as f64 - mean).powi(2))
            .sum::<f64>()
            / (count - 1) as f64;

        Ok(Self {
            count,
            min: casts[0],
            max: casts[count - 1],
            mean,
            median: casts[count / 2],
            stddev: variance.sqrt(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParseMode;

    /// `(name, space-separated labels)` pairs.
    fn labelled(actions: &[(&str, &str)]) -> ActionConfig {
        let body: Vec<String> = actions
            .iter()
            .enumerate()
            .map(|(i, (name, labels))| {
                let labels: Vec<String> = labels
                    .split_whitespace()
                    .map(|l| format!("\"{l}\""))
                    .collect();
                format!(
                    r#"{{ "action": "change_var_basetype", "name": "{name}", "uid": {i},
                         "from_type": "double", "to_type": "float", "labels": [{}] }}"#,
                    labels.join(",")
                )
            })
            .collect();
        let text = format!(r#"{{ "version": "1", "actions": [{}] }}"#, body.join(","));
        ActionConfig::parse_str(&text, ParseMode::Strict).expect("fixture")
    }

    fn casts(n: i64) -> ActionConfig {
        let text = format!(
            r#"{{ "version": "1", "actions": [], "craft_attrs": {{ "new_casts": {n} }} }}"#
        );
        ActionConfig::parse_str(&text, ParseMode::Strict).expect("fixture")
    }

    #[test]
    fn histogram_and_per_label_lists() {
        let cfg = labelled(&[("a", "x"), ("b", "x y"), ("c", "z")]);
        let stats = LabelStatistics::compute(&[cfg]);

        assert_eq!(stats.label_set_sizes.get(&1), Some(&2));
        assert_eq!(stats.label_set_sizes.get(&2), Some(&1));
        assert_eq!(stats.per_label["x"], vec!["a", "b"]);
        assert_eq!(stats.per_label["z"], vec!["c"]);
        assert_eq!(stats.groups[&1], vec!["a", "b"]);
        assert_eq!(stats.groups[&2], vec!["c"]);
        assert_eq!(stats.linked_groups().count(), 1);
    }

    #[test]
    fn bridging_action_merges_groups() {
        // a and b start separate groups; c shares a label with each.
        let cfg = labelled(&[("a", "x"), ("b", "y"), ("c", "y x"), ("d", "w")]);
        let stats = LabelStatistics::compute(&[cfg]);

        assert_eq!(stats.groups.len(), 2);
        assert_eq!(stats.groups[&1], vec!["a", "b", "c"]);
        assert_eq!(stats.groups[&2], vec!["d"]);
    }

    #[test]
    fn grouping_ignores_processing_order() {
        let forward = labelled(&[("a", "x"), ("b", "y"), ("c", "x y")]);
        let backward = labelled(&[("c", "x y"), ("b", "y"), ("a", "x")]);

        for cfg in [forward, backward] {
            let stats = LabelStatistics::compute(&[cfg]);
            assert_eq!(stats.groups.len(), 1);
            let mut members = stats.groups[&1].clone();
            members.sort();
            assert_eq!(members, vec!["a", "b", "c"]);
        }
    }

    #[test]
    fn groups_span_configs() {
        let first = labelled(&[("a", "x")]);
        let second = labelled(&[("b", "x")]);
        let stats = LabelStatistics::compute(&[first, second]);
        assert_eq!(stats.groups[&1], vec!["a", "b"]);
    }

    #[test]
    fn labelled_actions_of_any_kind_are_grouped() {
        let text = r#"{ "version": "1", "actions": [
            { "action": "change_var_basetype", "name": "a", "uid": 1,
              "from_type": "double", "to_type": "float", "labels": ["x"] },
            { "action": "change_every_basetype", "scope": "solver",
              "from_type": "double", "to_type": "float", "labels": ["x", "y"] },
            { "action": "custom_kind", "name": "c", "labels": ["y"] },
            { "action": "add_include", "name": "adapt.h" }
        ] }"#;
        let cfg = ActionConfig::parse_str(text, ParseMode::Strict).expect("fixture");
        let stats = LabelStatistics::compute(&[cfg]);

        assert_eq!(stats.label_set_sizes.get(&1), Some(&2));
        assert_eq!(stats.label_set_sizes.get(&2), Some(&1));
        assert_eq!(stats.per_label["y"], vec!["<unnamed>", "c"]);
        assert_eq!(stats.groups.len(), 1);
        assert_eq!(stats.groups[&1].len(), 3);
    }

    #[test]
    fn cast_statistics_on_one_to_five() {
        let configs: Vec<ActionConfig> = [3, 1, 5, 2, 4].into_iter().map(casts).collect();
        let stats = CastStatistics::compute(&configs).expect("stats");

        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, 1);
        assert_eq!(stats.max, 5);
        assert!((stats.mean - 3.0).abs() < 1e-12);
        assert_eq!(stats.median, 3);
        assert!((stats.stddev - 1.5811).abs() < 1e-4);
    }

    #[test]
    fn even_sample_median_is_upper_middle() {
        let stats = CastStatistics::from_samples(vec![4, 1, 3, 2]).expect("stats");
        assert_eq!(stats.median, 3);
    }

    #[test]
    fn huge_cast_counts_do_not_overflow_the_sum() {
        let stats = CastStatistics::from_samples(vec![i64::MAX, i64::MAX]).expect("stats");
        assert_eq!(stats.max, i64::MAX);
        assert!((stats.mean - i64::MAX as f64).abs() < 1e3);
        assert_eq!(stats.stddev, 0.0);
    }

    #[test]
    fn too_few_samples_is_an_error() {
        let with_casts = casts(7);
        let without = ActionConfig::new(Vec::new());
        let err = CastStatistics::compute(&[with_casts, without]).unwrap_err();
        assert!(matches!(err, FloatSmithError::DegenerateStatistics { count: 1 }));

        let err = CastStatistics::from_samples(Vec::new()).unwrap_err();
        assert!(matches!(err, FloatSmithError::DegenerateStatistics { count: 0 }));
    }
}
