use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use serde::Serialize;

/// Static nutritional classification of the food taxonomy. A food name may
/// legitimately appear under several categories; duplicates within one
/// category collapse when the index is built.
pub const CLASSIFICATION: &[(&str, &[&str])] = &[
    (
        "fiber",
        &[
            "beet_salad",
            "bruschetta",
            "caesar_salad",
            "caprese_salad",
            "edamame",
            "falafel",
            "french_onion_soup",
            "greek_salad",
            "guacamole",
            "hummus",
            "miso_soup",
            "seaweed_salad",
            "spring_rolls",
            "samosa",
        ],
    ),
    (
        "carbohydrate",
        &[
            "apple_pie",
            "baklava",
            "beignets",
            "bread_pudding",
            "breakfast_burrito",
            "cannoli",
            "carrot_cake",
            "cheesecake",
            "chocolate_cake",
            "chocolate_mousse",
            "churros",
            "club_sandwich",
            "creme_brulee",
            "croque_madame",
            "cup_cakes",
            "donuts",
            "dumplings",
            "french_fries",
            "french_toast",
            "fried_rice",
            "frozen_yogurt",
            "garlic_bread",
            "gnocchi",
            "grilled_cheese_sandwich",
            "ice_cream",
            "lasagna",
            "lobster_roll_sandwich",
            "macaroni_and_cheese",
            "macarons",
            "nachos",
            "onion_rings",
            "pad_thai",
            "pancakes",
            "panna_cotta",
            "pizza",
            "poutine",
            "ramen",
            "ravioli",
            "red_velvet_cake",
            "risotto",
            "spaghetti_bolognese",
            "spaghetti_carbonara",
            "strawberry_shortcake",
            "tacos",
            "takoyaki",
            "tiramisu",
            "waffles",
        ],
    ),
    (
        "fat",
        &[
            "baby_back_ribs",
            "baklava",
            "beignets",
            "bread_pudding",
            "cheese_plate",
            "cheesecake",
            "chicken_wings",
            "churros",
            "creme_brulee",
            "deviled_eggs",
            "donuts",
            "foie_gras",
            "fried_calamari",
            "fried_rice",
            "grilled_cheese_sandwich",
            "hamburger",
            "ice_cream",
            "macaroni_and_cheese",
            "nachos",
            "onion_rings",
            "poutine",
            "spring_rolls",
            "tiramisu",
        ],
    ),
    (
        "protein",
        &[
            "baby_back_ribs",
            "beef_carpaccio",
            "beef_tartare",
            "bibimbap",
            "ceviche",
            "cheese_plate",
            "chicken_curry",
            "chicken_quesadilla",
            "chicken_wings",
            "clam_chowder",
            "crab_cakes",
            "deviled_eggs",
            "edamame",
            "eggs_benedict",
            "escargots",
            "filet_mignon",
            "fish_and_chips",
            "foie_gras",
            "grilled_salmon",
            "hamburger",
            "hot_dog",
            "huevos_rancheros",
            "hummus",
            "lobster_bisque",
            "lobster_roll_sandwich",
            "mussels",
            "omelette",
            "oysters",
            "paella",
            "peking_duck",
            "pho",
            "pork_chop",
            "prime_rib",
            "pulled_pork_sandwich",
            "ramen",
            "sashimi",
            "scallops",
            "shrimp_and_grits",
            "steak",
            "sushi",
            "tacos",
            "takoyaki",
            "tuna_tartare",
        ],
    ),
];

/// Per-category and overall counts over the taxonomy. `total_entries` counts
/// (category, food) pairs, so a food in two categories counts twice there but
/// once in `distinct_foods`.
#[derive(Debug, Clone, Serialize)]
pub struct TaxonomyStats {
    pub per_category: BTreeMap<String, usize>,
    pub distinct_foods: usize,
    pub multi_category_foods: usize,
    pub total_entries: usize,
}

/// Precomputed category-membership index over the static taxonomy: the
/// forward category -> foods mapping plus its inversion, built once at first
/// use.
pub struct CategoryIndex {
    by_category: BTreeMap<&'static str, BTreeSet<&'static str>>,
    by_food: BTreeMap<&'static str, BTreeSet<&'static str>>,
}

static GLOBAL_INDEX: LazyLock<CategoryIndex> = LazyLock::new(CategoryIndex::build);

impl CategoryIndex {
    fn build() -> Self {
        let mut by_category: BTreeMap<&'static str, BTreeSet<&'static str>> = BTreeMap::new();
        let mut by_food: BTreeMap<&'static str, BTreeSet<&'static str>> = BTreeMap::new();
        for (category, foods) in CLASSIFICATION {
            let members = by_category.entry(category).or_default();
            for food in *foods {
                members.insert(food);
                by_food.entry(food).or_default().insert(category);
            }
        }
        Self {
            by_category,
            by_food,
        }
    }

    /// The process-wide index over `CLASSIFICATION`.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL_INDEX
    }

    /// All categories whose membership contains `food`; empty for unknown
    /// names.
    #[must_use]
    pub fn categories_of(&self, food: &str) -> Vec<String> {
        self.by_food
            .get(food)
            .map(|cats| cats.iter().map(|c| (*c).to_string()).collect())
            .unwrap_or_default()
    }

    /// Foods that belong to more than one category, each with its full
    /// category set.
    #[must_use]
    pub fn foods_with_multiple_categories(&self) -> BTreeMap<String, Vec<String>> {
        self.by_food
            .iter()
            .filter(|(_, cats)| cats.len() > 1)
            .map(|(food, cats)| {
                (
                    (*food).to_string(),
                    cats.iter().map(|c| (*c).to_string()).collect(),
                )
            })
            .collect()
    }

    #[must_use]
    pub fn statistics(&self) -> TaxonomyStats {
        let per_category: BTreeMap<String, usize> = self
            .by_category
            .iter()
            .map(|(category, members)| ((*category).to_string(), members.len()))
            .collect();
        let total_entries = per_category.values().sum();
        TaxonomyStats {
            per_category,
            distinct_foods: self.by_food.len(),
            multi_category_foods: self
                .by_food
                .values()
                .filter(|cats| cats.len() > 1)
                .count(),
            total_entries,
        }
    }

    /// Foods whose category set equals the given categories exactly, not a
    /// superset or subset match. Argument order and duplicates are irrelevant.
    #[must_use]
    pub fn filter_by_exact_category_set(&self, categories: &[&str]) -> Vec<String> {
        let wanted: BTreeSet<&str> = categories.iter().copied().collect();
        self.by_food
            .iter()
            .filter(|(_, cats)| {
                cats.len() == wanted.len() && cats.iter().all(|c| wanted.contains(*c))
            })
            .map(|(food, _)| (*food).to_string())
            .collect()
    }
}
