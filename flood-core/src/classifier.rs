//! Decision-tree ensemble used to map a [`FeatureVector`] to a [`RiskLevel`].
//!
//! The artifact is a JSON export of a random forest:
//!
//! ```json
//! {
//!   "features": ["rainfall", "soil_moisture", "elevation"],
//!   "classes": ["High", "Low", "Medium"],
//!   "trees": [
//!     { "nodes": [
//!         { "feature": 2, "threshold": 20.0, "left": 1, "right": 2 },
//!         { "value": [16.0, 0.0, 4.0] },
//!         { "value": [0.0, 18.0, 2.0] }
//!     ] }
//!   ]
//! }
//! ```
//!
//! A split sends a sample left when `x[feature] <= threshold`. Leaf values are
//! per-class sample counts (or weights) in `classes` order; each tree's leaf is
//! normalised to a distribution and the forest averages them.

use serde::Deserialize;
use std::{fs, path::Path};

use crate::{
    FeatureVector, RiskLevel, RiskPrediction,
    error::{FloodRiskError, Result},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

#[derive(Debug, Deserialize)]
struct ModelArtifact {
    features: Vec<String>,
    classes: Vec<String>,
    trees: Vec<Tree>,
}

/// Immutable pre-trained classifier. Load once, share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ClassifierModel {
    classes: Vec<RiskLevel>,
    trees: Vec<Tree>,
}

impl ClassifierModel {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            FloodRiskError::ModelUnavailable(format!(
                "failed to read model artifact {}: {e}",
                path.display()
            ))
        })?;

        let model = Self::from_json_str(&contents)?;
        tracing::info!(
            path = %path.display(),
            trees = model.n_trees(),
            "loaded classifier model"
        );
        Ok(model)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let artifact: ModelArtifact = serde_json::from_str(contents).map_err(|e| {
            FloodRiskError::ModelUnavailable(format!("failed to parse model artifact: {e}"))
        })?;

        Self::from_artifact(artifact)
    }

    fn from_artifact(artifact: ModelArtifact) -> Result<Self> {
        if artifact.features != FeatureVector::NAMES {
            return Err(unavailable(format!(
                "model expects features {:?}, service provides {:?}",
                artifact.features,
                FeatureVector::NAMES
            )));
        }

        let mut classes = Vec::with_capacity(artifact.classes.len());
        for name in &artifact.classes {
            let level = RiskLevel::try_from(name.as_str())?;
            if classes.contains(&level) {
                return Err(unavailable(format!("duplicate class '{name}'")));
            }
            classes.push(level);
        }
        if classes.is_empty() {
            return Err(unavailable("model declares no classes".into()));
        }

        if artifact.trees.is_empty() {
            return Err(unavailable("model contains no trees".into()));
        }

        let mut trees = artifact.trees;
        for (t, tree) in trees.iter_mut().enumerate() {
            validate_tree(tree, classes.len()).map_err(|msg| unavailable(format!("tree {t}: {msg}")))?;
        }

        Ok(Self { classes, trees })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn classes(&self) -> &[RiskLevel] {
        &self.classes
    }

    /// Averaged class probabilities, in artifact class order.
    pub fn probabilities(&self, features: &FeatureVector) -> Result<Vec<(RiskLevel, f64)>> {
        features.validate()?;

        let x = features.as_array();
        let mut totals = vec![0.0; self.classes.len()];

        for tree in &self.trees {
            for (total, p) in totals.iter_mut().zip(leaf_for(tree, &x)) {
                *total += p;
            }
        }

        let n = self.trees.len() as f64;
        Ok(self
            .classes
            .iter()
            .zip(totals)
            .map(|(level, total)| (*level, total / n))
            .collect())
    }

    /// Predict the risk level for `features`.
    ///
    /// Pure: identical inputs always yield the identical prediction. Ties go
    /// to the class listed first in the artifact.
    pub fn classify(&self, features: &FeatureVector) -> Result<RiskPrediction> {
        let probs = self.probabilities(features)?;

        let mut best = probs[0];
        for candidate in &probs[1..] {
            if candidate.1 > best.1 {
                best = *candidate;
            }
        }

        Ok(RiskPrediction {
            label: best.0,
            confidence: best.1,
        })
    }
}

fn unavailable(msg: String) -> FloodRiskError {
    FloodRiskError::ModelUnavailable(msg)
}

/// Check structure and normalise leaves to probability distributions.
///
/// Children must come after their parent, which rules out cycles and makes
/// traversal from node 0 always terminate.
fn validate_tree(tree: &mut Tree, n_classes: usize) -> std::result::Result<(), String> {
    let len = tree.nodes.len();
    if len == 0 {
        return Err("tree has no nodes".into());
    }

    for (i, node) in tree.nodes.iter_mut().enumerate() {
        match node {
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if *feature >= FeatureVector::NAMES.len() {
                    return Err(format!("node {i} splits on unknown feature index {feature}"));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {i} has a non-finite threshold"));
                }
                for child in [*left, *right] {
                    if child <= i || child >= len {
                        return Err(format!("node {i} has invalid child index {child}"));
                    }
                }
            }
            Node::Leaf { value } => {
                if value.len() != n_classes {
                    return Err(format!(
                        "leaf {i} has {} values, expected {n_classes}",
                        value.len()
                    ));
                }
                if value.iter().any(|v| !v.is_finite() || *v < 0.0) {
                    return Err(format!("leaf {i} has a negative or non-finite value"));
                }
                let sum: f64 = value.iter().sum();
                if sum <= 0.0 {
                    return Err(format!("leaf {i} has no weight"));
                }
                value.iter_mut().for_each(|v| *v /= sum);
            }
        }
    }

    Ok(())
}

fn leaf_for<'a>(tree: &'a Tree, x: &[f64; 3]) -> &'a [f64] {
    let mut idx = 0;
    loop {
        match &tree.nodes[idx] {
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                idx = if x[*feature] <= *threshold { *left } else { *right };
            }
            Node::Leaf { value } => return value,
        }
    }
}
