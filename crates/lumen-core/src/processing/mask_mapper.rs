//! Fuse multi-view segmentation masks into per-face part labels.

use crate::config::MappingConfig;
use crate::geometry::{FaceIdMap, KdTree, Mask};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Segmentation output for one rendered view.
#[derive(Debug, Clone)]
pub struct ViewMasks {
    /// Part name and mask, in the order the segmenter returned them.
    pub masks: Vec<(String, Mask)>,
    pub face_ids: FaceIdMap,
}

/// One label per face plus the part names the labels index.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLabels {
    pub labels: Vec<u8>,
    /// Distinct part names in first-seen order; label `i` is `part_names[i]`.
    pub part_names: Vec<String>,
    /// Faces labeled directly by a mask, before symmetry and fill.
    pub directly_labeled: usize,
}

/// Left/right naming patterns recognised for symmetric parts.
const SYMMETRIC_PATTERNS: &[(&str, &str)] = &[
    ("_left_", "_right_"),
    ("left_", "right_"),
    ("_left", "_right"),
];

fn symmetric_pair<'a>(name: &str, candidates: &'a [String]) -> Option<&'a str> {
    for (left, right) in SYMMETRIC_PATTERNS {
        let mirrored = if name.contains(left) {
            name.replace(left, right)
        } else if name.contains(right) {
            name.replace(right, left)
        } else {
            continue;
        };
        if let Some(found) = candidates.iter().find(|c| **c == mirrored) {
            return Some(found.as_str());
        }
    }
    None
}

/// Map masks to faces. Smaller masks win overlapping faces.
///
/// `part_names`, when given, enables the left/right symmetry heuristic.
/// Faces still unlabeled afterwards take the label of the nearest labeled
/// face centroid; with no labels at all every face gets part 0.
pub fn map_masks_to_faces(
    views: &[ViewMasks],
    centroids: &[[f32; 3]],
    part_names: Option<&[String]>,
) -> FaceLabels {
    let face_count = centroids.len();

    struct Entry<'a> {
        part: usize,
        mask: &'a Mask,
        face_ids: &'a FaceIdMap,
        area: usize,
    }

    let mut names: Vec<String> = Vec::new();
    let mut index_of: HashMap<&str, usize> = HashMap::new();
    let mut entries = Vec::new();
    for view in views {
        for (name, mask) in &view.masks {
            let part = *index_of.entry(name.as_str()).or_insert_with(|| {
                names.push(name.clone());
                names.len() - 1
            });
            entries.push(Entry {
                part,
                mask,
                face_ids: &view.face_ids,
                area: mask.area(),
            });
        }
    }

    if entries.is_empty() {
        warn!(faces = face_count, "No masks to map, labeling every face as part 0");
        return FaceLabels {
            labels: vec![0; face_count],
            part_names: names,
            directly_labeled: 0,
        };
    }

    // Stable sort keeps first-seen order among equal areas.
    entries.sort_by_key(|e| e.area);

    let mut labels: Vec<Option<usize>> = vec![None; face_count];
    let mut winning_area = vec![usize::MAX; face_count];
    for entry in &entries {
        for face in entry.face_ids.faces_under(entry.mask) {
            if face < face_count && entry.area < winning_area[face] {
                labels[face] = Some(entry.part);
                winning_area[face] = entry.area;
            }
        }
    }
    let directly_labeled = labels.iter().filter(|l| l.is_some()).count();

    if let Some(template_names) = part_names {
        apply_symmetry(&mut labels, centroids, &index_of, template_names);
    }

    fill_unlabeled(&mut labels, centroids);

    info!(
        faces = face_count,
        directly_labeled,
        parts_found = names.len(),
        "Mapped masks to faces"
    );

    FaceLabels {
        labels: labels
            .into_iter()
            .map(|l| l.map_or(0, |p| u8::try_from(p).unwrap_or(u8::MAX)))
            .collect(),
        part_names: names,
        directly_labeled,
    }
}

/// Mirror a labeled side onto its unlabeled partner across x = 0.
fn apply_symmetry(
    labels: &mut [Option<usize>],
    centroids: &[[f32; 3]],
    index_of: &HashMap<&str, usize>,
    template_names: &[String],
) {
    let mut checked: Vec<&str> = Vec::new();
    for name in template_names {
        if checked.contains(&name.as_str()) || !index_of.contains_key(name.as_str()) {
            continue;
        }
        let Some(pair) = symmetric_pair(name, template_names) else {
            continue;
        };
        let Some(&pair_index) = index_of.get(pair) else {
            continue;
        };
        checked.push(name);
        checked.push(pair);

        let name_index = index_of[name.as_str()];
        let count = |part: usize| labels.iter().filter(|l| **l == Some(part)).count();
        let (source, target) = match (count(name_index), count(pair_index)) {
            (a, 0) if a > 0 => (name_index, pair_index),
            (0, b) if b > 0 => (pair_index, name_index),
            _ => continue,
        };
        let cloned = clone_by_reflection(labels, centroids, source, target);
        debug!(source = %name, target = %pair, cloned, "Mirrored symmetric part");
    }
}

fn clone_by_reflection(
    labels: &mut [Option<usize>],
    centroids: &[[f32; 3]],
    source: usize,
    target: usize,
) -> usize {
    let unlabeled: Vec<usize> = (0..labels.len()).filter(|&i| labels[i].is_none()).collect();
    if unlabeled.is_empty() {
        return 0;
    }
    let unlabeled_centroids: Vec<[f32; 3]> = unlabeled.iter().map(|&i| centroids[i]).collect();
    let tree = KdTree::build(&unlabeled_centroids);
    let limit = MappingConfig::SYMMETRY_DISTANCE * MappingConfig::SYMMETRY_DISTANCE;

    let sources: Vec<usize> = (0..labels.len())
        .filter(|&i| labels[i] == Some(source))
        .collect();
    let mut cloned = 0;
    for face in sources {
        let [x, y, z] = centroids[face];
        if let Some((nearest, dist_sq)) = tree.nearest([-x, y, z]) {
            if dist_sq < limit {
                let target_face = unlabeled[nearest];
                if labels[target_face].is_none() {
                    cloned += 1;
                }
                labels[target_face] = Some(target);
            }
        }
    }
    cloned
}

fn fill_unlabeled(labels: &mut [Option<usize>], centroids: &[[f32; 3]]) {
    let labeled: Vec<usize> = (0..labels.len()).filter(|&i| labels[i].is_some()).collect();
    if labeled.is_empty() {
        warn!(faces = labels.len(), "No face was labeled, assigning part 0");
        labels.iter_mut().for_each(|l| *l = Some(0));
        return;
    }
    if labeled.len() == labels.len() {
        return;
    }

    let labeled_centroids: Vec<[f32; 3]> = labeled.iter().map(|&i| centroids[i]).collect();
    let tree = KdTree::build(&labeled_centroids);
    let fills: Vec<(usize, Option<usize>)> = (0..labels.len())
        .filter(|&i| labels[i].is_none())
        .map(|i| {
            let nearest = tree.nearest(centroids[i]).map(|(n, _)| labels[labeled[n]]);
            (i, nearest.flatten())
        })
        .collect();
    for (face, label) in fills {
        labels[face] = label.or(Some(0));
    }
}
