//! # Combiner
//!
//! Cartesian product of generator outputs and the per-combination context
//! handed to templates.
//!
//! The product is a left fold: the accumulator starts as one empty
//! combination and is multiplied by each list in declaration order, so the
//! last generator varies fastest. Later generators win key collisions.

use crate::config::EmptyGeneratorsPolicy;
use crate::controller::generators::ParameterElement;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Key under which the whole element is exposed to templates
pub const ELEMENT_KEY: &str = "Element";
/// Key under which the owning GitOpsSet is exposed to templates
pub const GITOPSSET_KEY: &str = "GitOpsSet";

/// Merge one element from every list, for every combination
///
/// Any empty list empties the product. No lists at all is decided by
/// `policy`.
pub fn cartesian(
    lists: &[Vec<ParameterElement>],
    policy: EmptyGeneratorsPolicy,
) -> Vec<ParameterElement> {
    if lists.is_empty() {
        return match policy {
            EmptyGeneratorsPolicy::NoElements => Vec::new(),
            EmptyGeneratorsPolicy::SingleEmptyElement => vec![ParameterElement::new()],
        };
    }

    lists
        .iter()
        .fold(vec![ParameterElement::new()], |acc, list| {
            acc.iter()
                .flat_map(|combined| list.iter().map(move |element| combined.merged(element)))
                .collect()
        })
}

/// Name and namespace of the owning GitOpsSet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerInfo {
    pub name: String,
    pub namespace: String,
}

impl Serialize for OwnerInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("Name", &self.name)?;
        map.serialize_entry("Namespace", &self.namespace)?;
        map.end()
    }
}

/// Variables visible to one template expansion
///
/// Element keys sit at the top level and again under `Element`. `GitOpsSet`
/// carries the owner. An element key named `Element` or `GitOpsSet` is only
/// reachable through `Element`.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub element: &'a ParameterElement,
    pub owner: &'a OwnerInfo,
}

impl<'a> RenderContext<'a> {
    pub fn new(element: &'a ParameterElement, owner: &'a OwnerInfo) -> Self {
        Self { element, owner }
    }
}

impl Serialize for RenderContext<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (key, value) in self.element.iter() {
            if key == ELEMENT_KEY || key == GITOPSSET_KEY {
                continue;
            }
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(ELEMENT_KEY, self.element)?;
        map.serialize_entry(GITOPSSET_KEY, self.owner)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn element(pairs: &[(&str, &str)]) -> ParameterElement {
        let mut e = ParameterElement::new();
        for (k, v) in pairs {
            e.insert(*k, *v);
        }
        e
    }

    #[test]
    fn test_product_is_complete_and_last_varies_fastest() {
        let envs = vec![element(&[("env", "dev")]), element(&[("env", "prod")])];
        let teams = vec![
            element(&[("team", "a")]),
            element(&[("team", "b")]),
            element(&[("team", "c")]),
        ];

        let product = cartesian(&[envs, teams], EmptyGeneratorsPolicy::NoElements);
        assert_eq!(product.len(), 6);

        let pairs: Vec<(String, String)> = product
            .iter()
            .map(|e| {
                (
                    e.get_json("env").unwrap().as_str().unwrap().to_string(),
                    e.get_json("team").unwrap().as_str().unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(pairs[0], ("dev".to_string(), "a".to_string()));
        assert_eq!(pairs[1], ("dev".to_string(), "b".to_string()));
        assert_eq!(pairs[3], ("prod".to_string(), "a".to_string()));
    }

    #[test]
    fn test_later_generator_wins_collisions() {
        let first = vec![element(&[("env", "dev"), ("region", "eu")])];
        let second = vec![element(&[("env", "prod")])];
        let product = cartesian(&[first, second], EmptyGeneratorsPolicy::NoElements);
        assert_eq!(product.len(), 1);
        assert_eq!(product[0].get_json("env"), Some(&json!("prod")));
        assert_eq!(product[0].get_json("region"), Some(&json!("eu")));
    }

    #[test]
    fn test_any_empty_list_empties_the_product() {
        let product = cartesian(
            &[vec![element(&[("env", "dev")])], Vec::new()],
            EmptyGeneratorsPolicy::SingleEmptyElement,
        );
        assert!(product.is_empty());
    }

    #[test]
    fn test_no_generators_policy() {
        assert!(cartesian(&[], EmptyGeneratorsPolicy::NoElements).is_empty());
        assert_eq!(
            cartesian(&[], EmptyGeneratorsPolicy::SingleEmptyElement),
            vec![ParameterElement::new()]
        );
    }

    #[test]
    fn test_render_context_shape() {
        let e = element(&[("env", "dev"), ("GitOpsSet", "shadowed")]);
        let owner = OwnerInfo {
            name: "demo".to_string(),
            namespace: "default".to_string(),
        };
        let value = serde_json::to_value(RenderContext::new(&e, &owner)).unwrap();
        assert_eq!(
            value,
            json!({
                "env": "dev",
                "Element": {"env": "dev", "GitOpsSet": "shadowed"},
                "GitOpsSet": {"Name": "demo", "Namespace": "default"}
            })
        );
    }
}
