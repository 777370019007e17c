//! Concept-to-template resolution.
//!
//! The table is static; resolution never fails and falls back to the
//! single-part `default` template for nouns it does not know.

use crate::cache::lemmatize;
use std::collections::HashMap;
use std::sync::LazyLock;

/// A named decomposition of a concept into semantic parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub kind: &'static str,
    pub part_names: &'static [&'static str],
    nouns: &'static [&'static str],
}

impl Template {
    pub fn num_parts(&self) -> usize {
        self.part_names.len()
    }

    pub fn part_names_owned(&self) -> Vec<String> {
        self.part_names.iter().map(|s| s.to_string()).collect()
    }

    pub fn is_default(&self) -> bool {
        self.kind == DEFAULT.kind
    }
}

const DEFAULT: Template = Template {
    kind: "default",
    part_names: &["body"],
    nouns: &[],
};

/// All concrete templates followed by `default`.
pub static TEMPLATES: &[Template] = &[
    Template {
        kind: "quadruped",
        part_names: &["head", "body", "front_legs", "back_legs", "tail", "neck"],
        nouns: &[
            "horse", "dog", "cat", "cow", "lion", "tiger", "deer", "wolf", "bear", "elephant",
            "giraffe", "zebra", "fox", "rabbit", "pony", "stallion", "mare", "mustang", "puppy",
            "kitten", "leopard", "cheetah", "panther", "moose", "rhino", "hippo", "camel",
        ],
    },
    Template {
        kind: "biped",
        part_names: &["head", "torso", "left_arm", "right_arm", "left_leg", "right_leg"],
        nouns: &[
            "person", "human", "man", "woman", "child", "robot", "soldier", "dancer",
            "astronaut", "knight", "warrior", "zombie", "skeleton", "angel", "devil", "ninja",
            "samurai", "pirate",
        ],
    },
    Template {
        kind: "bird",
        part_names: &["head", "body", "left_wing", "right_wing", "tail", "legs"],
        nouns: &[
            "bird", "eagle", "hawk", "owl", "parrot", "penguin", "flamingo", "crow", "raven",
            "dove", "sparrow", "hummingbird", "swan", "pelican", "toucan", "falcon", "vulture",
        ],
    },
    Template {
        kind: "fish",
        part_names: &["head", "body", "tail_fin", "dorsal_fin", "pectoral_fins"],
        nouns: &[
            "fish", "shark", "whale", "dolphin", "goldfish", "tuna", "swordfish", "ray",
            "seahorse", "octopus", "squid", "jellyfish",
        ],
    },
    Template {
        kind: "vehicle",
        part_names: &["body", "wheels", "windshield", "roof"],
        nouns: &[
            "car", "truck", "bus", "motorcycle", "van", "jeep", "taxi", "ambulance",
            "firetruck", "tractor",
        ],
    },
    Template {
        kind: "aircraft",
        part_names: &["fuselage", "left_wing", "right_wing", "tail", "engines"],
        nouns: &["airplane", "jet", "helicopter", "plane", "biplane", "glider", "drone"],
    },
    Template {
        kind: "furniture",
        part_names: &["seat", "backrest", "legs"],
        nouns: &["chair", "stool", "bench", "throne", "couch", "sofa", "armchair", "recliner"],
    },
    Template {
        kind: "plant",
        part_names: &["trunk", "canopy", "roots"],
        nouns: &[
            "tree", "palm", "oak", "pine", "willow", "birch", "maple", "cactus", "bamboo",
            "bonsai",
        ],
    },
    Template {
        kind: "building",
        part_names: &["walls", "roof", "windows", "door", "foundation"],
        nouns: &[
            "house", "building", "castle", "church", "cabin", "temple", "tower", "lighthouse",
            "barn", "mosque", "cathedral",
        ],
    },
    Template {
        kind: "insect",
        part_names: &["head", "thorax", "abdomen", "wings", "legs"],
        nouns: &[
            "butterfly", "bee", "dragonfly", "beetle", "ant", "spider", "moth", "wasp",
            "grasshopper", "ladybug", "scorpion",
        ],
    },
    DEFAULT,
];

static NOUN_INDEX: LazyLock<HashMap<&'static str, &'static Template>> = LazyLock::new(|| {
    TEMPLATES
        .iter()
        .flat_map(|template| template.nouns.iter().map(move |noun| (*noun, template)))
        .collect()
});

/// Resolve a concept to its template.
///
/// Exact lowercase match first; otherwise the last token that matches
/// after singularization (the head noun of "a big red horse" is "horse").
pub fn resolve(concept: &str) -> &'static Template {
    let lowered = concept.trim().to_lowercase();
    if let Some(template) = NOUN_INDEX.get(lowered.as_str()) {
        return template;
    }

    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .rev()
        .find_map(|token| {
            NOUN_INDEX
                .get(token)
                .or_else(|| NOUN_INDEX.get(lemmatize(token).as_ref()))
                .copied()
        })
        .unwrap_or(&TEMPLATES[TEMPLATES.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_lookup() {
        let template = resolve("horse");
        assert_eq!(template.kind, "quadruped");
        assert_eq!(template.num_parts(), 6);
        assert_eq!(resolve("Eagle").kind, "bird");
    }

    #[test]
    fn test_head_noun_and_plurals() {
        assert_eq!(resolve("a big red horse").kind, "quadruped");
        assert_eq!(resolve("horses").kind, "quadruped");
        assert_eq!(resolve("wooden chairs").kind, "furniture");
        assert_eq!(resolve("a castle on a hill").kind, "building");
    }

    #[test]
    fn test_unknown_resolves_to_default() {
        let template = resolve("quantum flux");
        assert!(template.is_default());
        assert_eq!(template.part_names, &["body"]);
    }

    #[test]
    fn test_every_template_has_parts() {
        for template in TEMPLATES {
            assert!(!template.part_names.is_empty(), "{}", template.kind);
            assert!(template.num_parts() <= u8::MAX as usize);
        }
    }
}
