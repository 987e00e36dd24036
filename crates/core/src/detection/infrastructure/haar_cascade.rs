//! Boosted Haar cascade loaded from the OpenCV XML storage format.
//!
//! Only the current `opencv-cascade-classifier` layout with `BOOST` stages
//! and upright `HAAR` features is understood. Tilted features and LBP
//! cascades are rejected at load time rather than evaluated incorrectly.

use std::path::Path;

use roxmltree::Node;
use thiserror::Error;

use super::integral_image::IntegralImage;

#[derive(Error, Debug)]
pub enum CascadeLoadError {
    #[error("failed to read cascade {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed cascade XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("cascade is missing <{0}>")]
    Missing(&'static str),
    #[error("invalid value in <{element}>: {value}")]
    InvalidValue { element: &'static str, value: String },
    #[error("unsupported cascade: {0}")]
    Unsupported(String),
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct WeightedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f64,
}

#[derive(Clone, Debug, PartialEq)]
struct HaarFeature {
    rects: Vec<WeightedRect>,
}

impl HaarFeature {
    fn response(&self, ii: &IntegralImage, x: u32, y: u32) -> f64 {
        self.rects
            .iter()
            .map(|r| r.weight * ii.sum(x + r.x, y + r.y, r.width, r.height) as f64)
            .sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct TreeNode {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

#[derive(Clone, Debug, PartialEq)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f64>,
}

impl WeakClassifier {
    /// Positive child values index `nodes`, zero and negatives index `leaves`
    /// by magnitude. Load-time validation guarantees the walk terminates.
    fn evaluate(&self, value_of: impl Fn(usize) -> f64) -> f64 {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            let next = if value_of(node.feature) < node.threshold {
                node.left
            } else {
                node.right
            };
            if next > 0 {
                idx = next as usize;
            } else {
                return self.leaves[next.unsigned_abs() as usize];
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Stage {
    threshold: f64,
    classifiers: Vec<WeakClassifier>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    pub fn from_file(path: &Path) -> Result<Self, CascadeLoadError> {
        let xml = std::fs::read_to_string(path).map_err(|source| CascadeLoadError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_xml(&xml)
    }

    pub fn from_xml(xml: &str) -> Result<Self, CascadeLoadError> {
        let doc = roxmltree::Document::parse(xml)?;
        let root = doc.root_element();
        let cascade = root
            .children()
            .find(|n| n.is_element() && child(*n, "stages").is_some())
            .ok_or_else(|| {
                if root.descendants().any(|n| n.has_tag_name("trees")) {
                    CascadeLoadError::Unsupported("legacy cascade layout".into())
                } else {
                    CascadeLoadError::Missing("stages")
                }
            })?;

        if let Some(stage_type) = child_text(cascade, "stageType") {
            if stage_type != "BOOST" {
                return Err(CascadeLoadError::Unsupported(format!(
                    "stage type {stage_type}"
                )));
            }
        }
        let feature_type = child_text(cascade, "featureType").unwrap_or("HAAR");
        if feature_type != "HAAR" {
            return Err(CascadeLoadError::Unsupported(format!(
                "feature type {feature_type}"
            )));
        }

        let window_width: u32 = parse_scalar(cascade, "width")?;
        let window_height: u32 = parse_scalar(cascade, "height")?;
        if window_width < 3 || window_height < 3 {
            return Err(CascadeLoadError::InvalidValue {
                element: "width",
                value: format!("{window_width}x{window_height}"),
            });
        }

        let features = elements(child(cascade, "features").ok_or(CascadeLoadError::Missing("features"))?)
            .map(|f| parse_feature(f, window_width, window_height))
            .collect::<Result<Vec<_>, _>>()?;

        let stages = elements(child(cascade, "stages").ok_or(CascadeLoadError::Missing("stages"))?)
            .map(|s| parse_stage(s, features.len()))
            .collect::<Result<Vec<_>, _>>()?;
        if stages.is_empty() {
            return Err(CascadeLoadError::Missing("stages"));
        }

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
        })
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Runs every stage on the window whose top-left corner is `(x, y)`.
    ///
    /// Feature responses are normalized by the pixel standard deviation of
    /// the window interior so the cascade is insensitive to contrast.
    pub fn accepts(&self, ii: &IntegralImage, x: u32, y: u32) -> bool {
        let (nw, nh) = (self.window_width - 2, self.window_height - 2);
        let area = (nw * nh) as f64;
        let sum = ii.sum(x + 1, y + 1, nw, nh) as f64;
        let sq_sum = ii.sq_sum(x + 1, y + 1, nw, nh) as f64;
        let variance = area * sq_sum - sum * sum;
        let norm = if variance > 0.0 { variance.sqrt() } else { 1.0 };

        self.stages.iter().all(|stage| {
            let total: f64 = stage
                .classifiers
                .iter()
                .map(|wc| wc.evaluate(|fi| self.features[fi].response(ii, x, y) / norm))
                .sum();
            total >= stage.threshold
        })
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn child_text<'a>(node: Node<'a, '_>, tag: &str) -> Option<&'a str> {
    child(node, tag).and_then(|n| n.text()).map(str::trim)
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn parse_scalar<T: std::str::FromStr>(
    node: Node,
    tag: &'static str,
) -> Result<T, CascadeLoadError> {
    let text = child_text(node, tag).ok_or(CascadeLoadError::Missing(tag))?;
    text.parse().map_err(|_| CascadeLoadError::InvalidValue {
        element: tag,
        value: text.to_string(),
    })
}

fn parse_numbers(node: Node, tag: &'static str) -> Result<Vec<f64>, CascadeLoadError> {
    let text = child_text(node, tag).ok_or(CascadeLoadError::Missing(tag))?;
    text.split_whitespace()
        .map(|tok| {
            tok.parse::<f64>().map_err(|_| CascadeLoadError::InvalidValue {
                element: tag,
                value: tok.to_string(),
            })
        })
        .collect()
}

fn parse_feature(node: Node, win_w: u32, win_h: u32) -> Result<HaarFeature, CascadeLoadError> {
    if child_text(node, "tilted").is_some_and(|t| t != "0") {
        return Err(CascadeLoadError::Unsupported("tilted features".into()));
    }
    let rects_node = child(node, "rects").ok_or(CascadeLoadError::Missing("rects"))?;
    let rects = elements(rects_node)
        .map(|r| {
            let text = r.text().unwrap_or("").trim();
            let invalid = || CascadeLoadError::InvalidValue {
                element: "rects",
                value: text.to_string(),
            };
            let v: Vec<f64> = text
                .split_whitespace()
                .map(|t| t.parse::<f64>().map_err(|_| invalid()))
                .collect::<Result<_, _>>()?;
            if v.len() != 5 || v[..4].iter().any(|c| *c < 0.0) {
                return Err(invalid());
            }
            let rect = WeightedRect {
                x: v[0] as u32,
                y: v[1] as u32,
                width: v[2] as u32,
                height: v[3] as u32,
                weight: v[4],
            };
            if rect.x + rect.width > win_w || rect.y + rect.height > win_h {
                return Err(invalid());
            }
            Ok(rect)
        })
        .collect::<Result<Vec<_>, _>>()?;
    if rects.is_empty() {
        return Err(CascadeLoadError::Missing("rects"));
    }
    Ok(HaarFeature { rects })
}

fn parse_stage(node: Node, feature_count: usize) -> Result<Stage, CascadeLoadError> {
    let threshold: f64 = parse_scalar(node, "stageThreshold")?;
    let classifiers_node =
        child(node, "weakClassifiers").ok_or(CascadeLoadError::Missing("weakClassifiers"))?;
    let classifiers = elements(classifiers_node)
        .map(|wc| parse_weak_classifier(wc, feature_count))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stage {
        threshold,
        classifiers,
    })
}

fn parse_weak_classifier(
    node: Node,
    feature_count: usize,
) -> Result<WeakClassifier, CascadeLoadError> {
    let raw_nodes = parse_numbers(node, "internalNodes")?;
    let leaves = parse_numbers(node, "leafValues")?;
    let invalid = |value: String| CascadeLoadError::InvalidValue {
        element: "internalNodes",
        value,
    };
    if raw_nodes.is_empty() || raw_nodes.len() % 4 != 0 {
        return Err(invalid(format!("{} values", raw_nodes.len())));
    }

    let node_count = raw_nodes.len() / 4;
    let nodes = raw_nodes
        .chunks_exact(4)
        .enumerate()
        .map(|(i, c)| {
            let node = TreeNode {
                left: c[0] as i32,
                right: c[1] as i32,
                feature: c[2] as usize,
                threshold: c[3],
            };
            if c[2] < 0.0 || node.feature >= feature_count {
                return Err(invalid(format!("feature index {}", c[2])));
            }
            for next in [node.left, node.right] {
                let ok = if next > 0 {
                    (next as usize) > i && (next as usize) < node_count
                } else {
                    (next.unsigned_abs() as usize) < leaves.len()
                };
                if !ok {
                    return Err(invalid(format!("child index {next}")));
                }
            }
            Ok(node)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(WeakClassifier { nodes, leaves })
}
