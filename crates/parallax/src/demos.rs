//! Read-only table of parallax demos.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::error::RenderError;

/// Per-axis displacement divisors. Larger values produce a subtler parallax.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub horizontal: f32,
    pub vertical: f32,
}

impl Thresholds {
    pub fn new(horizontal: f32, vertical: f32) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let valid = |value: f32| value.is_finite() && value > 0.0;
        if valid(self.horizontal) && valid(self.vertical) {
            Ok(())
        } else {
            Err(format!(
                "thresholds must be positive and finite (got {} / {})",
                self.horizontal, self.vertical
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemoDescriptor {
    pub id: String,
    pub display_name: String,
    /// Color image name resolved by the image source.
    pub image: String,
    /// Depth map name; only the red channel is sampled.
    pub depth: String,
    pub thresholds: Thresholds,
}

impl DemoDescriptor {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        image: impl Into<String>,
        depth: impl Into<String>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            image: image.into(),
            depth: depth.into(),
            thresholds,
        }
    }

    /// Descriptor using the `img/<id>.jpg` + `img/<id>-map.jpg` naming convention.
    pub fn conventional(id: &str, display_name: &str, horizontal: f32, vertical: f32) -> Self {
        Self::new(
            id,
            display_name,
            format!("img/{id}.jpg"),
            format!("img/{id}-map.jpg"),
            Thresholds::new(horizontal, vertical),
        )
    }
}

pub const DEFAULT_DEMO: &str = "lady";

/// Ordered demo table with constant-time lookup by id.
#[derive(Debug, Clone)]
pub struct DemoRegistry {
    demos: Vec<DemoDescriptor>,
    index: HashMap<String, usize>,
}

impl DemoRegistry {
    /// Process-wide table of the demos that ship with the renderer.
    pub fn builtin() -> Arc<DemoRegistry> {
        static BUILTIN: OnceLock<Arc<DemoRegistry>> = OnceLock::new();
        Arc::clone(BUILTIN.get_or_init(|| {
            let demos = vec![
                DemoDescriptor::conventional("lady", "Lady Portrait", 35.0, 15.0),
                DemoDescriptor::conventional("ball", "Abstract Ball", 15.0, 25.0),
                DemoDescriptor::conventional("mount", "Mountain", 15.0, 25.0),
                DemoDescriptor::conventional("canyon", "Canyon", 35.0, 25.0),
            ];
            let index = demos
                .iter()
                .enumerate()
                .map(|(position, demo)| (demo.id.clone(), position))
                .collect();
            Arc::new(DemoRegistry { demos, index })
        }))
    }

    /// Builds a table from caller-supplied descriptors, rejecting empty tables, blank or
    /// duplicate ids and invalid thresholds.
    pub fn from_descriptors(demos: Vec<DemoDescriptor>) -> Result<Self, RenderError> {
        if demos.is_empty() {
            return Err(RenderError::InvalidDemoTable(
                "at least one demo is required".into(),
            ));
        }
        let mut index = HashMap::with_capacity(demos.len());
        for (position, demo) in demos.iter().enumerate() {
            if demo.id.trim().is_empty() {
                return Err(RenderError::InvalidDemoTable(format!(
                    "demo #{position} has an empty id"
                )));
            }
            if demo.image.trim().is_empty() || demo.depth.trim().is_empty() {
                return Err(RenderError::InvalidDemoTable(format!(
                    "demo '{}' must name both an image and a depth map",
                    demo.id
                )));
            }
            demo.thresholds
                .validate()
                .map_err(|reason| RenderError::InvalidDemoTable(format!("demo '{}': {reason}", demo.id)))?;
            if index.insert(demo.id.clone(), position).is_some() {
                return Err(RenderError::InvalidDemoTable(format!(
                    "duplicate demo id '{}'",
                    demo.id
                )));
            }
        }
        Ok(Self { demos, index })
    }

    pub fn get(&self, id: &str) -> Result<&DemoDescriptor, RenderError> {
        self.position(id)
            .map(|position| &self.demos[position])
            .ok_or_else(|| RenderError::UnknownDemo(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn nth(&self, position: usize) -> Option<&DemoDescriptor> {
        self.demos.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DemoDescriptor> {
        self.demos.iter()
    }

    pub fn len(&self) -> usize {
        self.demos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.demos.is_empty()
    }

    /// First entry of the table, or [`DEFAULT_DEMO`] when the table contains it.
    pub fn default_id(&self) -> &str {
        if self.contains(DEFAULT_DEMO) {
            DEFAULT_DEMO
        } else {
            &self.demos[0].id
        }
    }

    /// Next demo in table order, wrapping around.
    pub fn next_after(&self, id: &str) -> &DemoDescriptor {
        let next = self
            .position(id)
            .map_or(0, |position| (position + 1) % self.demos.len());
        &self.demos[next]
    }

    /// Previous demo in table order, wrapping around.
    pub fn previous_before(&self, id: &str) -> &DemoDescriptor {
        let len = self.demos.len();
        let previous = self
            .position(id)
            .map_or(len - 1, |position| (position + len - 1) % len);
        &self.demos[previous]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_matches_shipped_demos() {
        let registry = DemoRegistry::builtin();
        let ids: Vec<_> = registry.iter().map(|demo| demo.id.as_str()).collect();
        assert_eq!(ids, ["lady", "ball", "mount", "canyon"]);

        let lady = registry.get("lady").unwrap();
        assert_eq!(lady.thresholds, Thresholds::new(35.0, 15.0));
        assert_eq!(lady.image, "img/lady.jpg");
        assert_eq!(lady.depth, "img/lady-map.jpg");
        assert_eq!(lady.display_name, "Lady Portrait");

        let canyon = registry.get("canyon").unwrap();
        assert_eq!(canyon.thresholds, Thresholds::new(35.0, 25.0));
        assert_eq!(registry.default_id(), "lady");
    }

    #[test]
    fn builtin_table_is_shared() {
        assert!(Arc::ptr_eq(&DemoRegistry::builtin(), &DemoRegistry::builtin()));
    }

    #[test]
    fn unknown_id_is_reported() {
        let err = DemoRegistry::builtin().get("nope").unwrap_err();
        assert!(matches!(err, RenderError::UnknownDemo(id) if id == "nope"));
    }

    #[test]
    fn navigation_wraps() {
        let registry = DemoRegistry::builtin();
        assert_eq!(registry.next_after("canyon").id, "lady");
        assert_eq!(registry.next_after("lady").id, "ball");
        assert_eq!(registry.previous_before("lady").id, "canyon");
        assert_eq!(registry.previous_before("mount").id, "ball");
        assert_eq!(registry.nth(2).map(|demo| demo.id.as_str()), Some("mount"));
        assert!(registry.nth(9).is_none());
    }

    #[test]
    fn custom_table_rejects_duplicates_and_bad_thresholds() {
        let duplicate = DemoRegistry::from_descriptors(vec![
            DemoDescriptor::conventional("a", "A", 10.0, 10.0),
            DemoDescriptor::conventional("a", "A again", 10.0, 10.0),
        ]);
        assert!(matches!(duplicate, Err(RenderError::InvalidDemoTable(_))));

        let zero = DemoRegistry::from_descriptors(vec![DemoDescriptor::conventional(
            "a", "A", 0.0, 10.0,
        )]);
        assert!(matches!(zero, Err(RenderError::InvalidDemoTable(_))));

        let empty = DemoRegistry::from_descriptors(Vec::new());
        assert!(matches!(empty, Err(RenderError::InvalidDemoTable(_))));
    }

    #[test]
    fn custom_table_without_lady_defaults_to_first() {
        let registry = DemoRegistry::from_descriptors(vec![
            DemoDescriptor::conventional("dunes", "Dunes", 20.0, 20.0),
            DemoDescriptor::conventional("city", "City", 30.0, 20.0),
        ])
        .unwrap();
        assert_eq!(registry.default_id(), "dunes");
        assert_eq!(registry.len(), 2);
    }
}
