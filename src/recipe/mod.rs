//! Recipe Catalog.
//!
//! Recipes are a static, in-process catalog (not substrate- or
//! database-backed) — a recipe is a deployment-time template, not tenant
//! data, so it ships compiled into the binary rather than as a row
//! somewhere.

use serde::{Deserialize, Serialize};

use crate::model::AgentKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeParameter {
    pub name: String,
    pub required: bool,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub slug: String,
    pub category: String,
    pub agent_kind: AgentKind,
    pub work_mode: String,
    pub required_context_types: Vec<String>,
    pub parameters: Vec<RecipeParameter>,
    pub active: bool,
}

pub struct RecipeCatalog {
    recipes: Vec<Recipe>,
}

impl Default for RecipeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl RecipeCatalog {
    pub fn new() -> Self {
        Self {
            recipes: vec![
                Recipe {
                    slug: "research_deep_dive".to_string(),
                    category: "research".to_string(),
                    agent_kind: AgentKind::Research,
                    work_mode: "deep_dive".to_string(),
                    required_context_types: vec!["problem".to_string()],
                    parameters: vec![RecipeParameter {
                        name: "topic".to_string(),
                        required: true,
                        description: "Subject to investigate".to_string(),
                    }],
                    active: true,
                },
                Recipe {
                    slug: "research_competitive_scan".to_string(),
                    category: "research".to_string(),
                    agent_kind: AgentKind::Research,
                    work_mode: "competitive_scan".to_string(),
                    required_context_types: vec!["problem".to_string(), "customer".to_string()],
                    parameters: vec![RecipeParameter {
                        name: "competitors".to_string(),
                        required: false,
                        description: "Known competitor names to prioritize".to_string(),
                    }],
                    active: true,
                },
                Recipe {
                    slug: "content_social_post".to_string(),
                    category: "content".to_string(),
                    agent_kind: AgentKind::Content,
                    work_mode: "social_post".to_string(),
                    required_context_types: vec!["brand".to_string()],
                    parameters: vec![
                        RecipeParameter {
                            name: "platform".to_string(),
                            required: true,
                            description: "Target platform (e.g. linkedin, x)".to_string(),
                        },
                        RecipeParameter {
                            name: "variant_count".to_string(),
                            required: false,
                            description: "Number of copy variants to draft".to_string(),
                        },
                    ],
                    active: true,
                },
                Recipe {
                    slug: "reporting_weekly_summary".to_string(),
                    category: "reporting".to_string(),
                    agent_kind: AgentKind::Reporting,
                    work_mode: "weekly_summary".to_string(),
                    required_context_types: vec!["problem".to_string()],
                    parameters: vec![RecipeParameter {
                        name: "period_days".to_string(),
                        required: false,
                        description: "Lookback window in days (default 7)".to_string(),
                    }],
                    active: true,
                },
            ],
        }
    }

    pub fn list(&self, category: Option<&str>) -> Vec<&Recipe> {
        self.recipes
            .iter()
            .filter(|r| r.active)
            .filter(|r| category.is_none_or(|c| r.category == c))
            .collect()
    }

    pub fn get(&self, slug: &str) -> Option<&Recipe> {
        self.recipes.iter().find(|r| r.slug == slug && r.active)
    }

    /// Validates the given parameters carry every name the recipe requires.
    pub fn validate_parameters(
        recipe: &Recipe,
        parameters: &serde_json::Value,
    ) -> Result<(), String> {
        let obj = parameters.as_object();
        for param in &recipe.parameters {
            if !param.required {
                continue;
            }
            let present = obj.map(|o| o.contains_key(&param.name)).unwrap_or(false);
            if !present {
                return Err(format!("missing required parameter: {}", param.name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_filters_by_category() {
        let catalog = RecipeCatalog::new();
        let research = catalog.list(Some("research"));
        assert!(research.iter().all(|r| r.category == "research"));
        assert!(!research.is_empty());
    }

    #[test]
    fn validate_parameters_rejects_missing_required() {
        let catalog = RecipeCatalog::new();
        let recipe = catalog.get("research_deep_dive").unwrap();
        let err = RecipeCatalog::validate_parameters(recipe, &serde_json::json!({})).unwrap_err();
        assert!(err.contains("topic"));
    }

    #[test]
    fn validate_parameters_accepts_required_present() {
        let catalog = RecipeCatalog::new();
        let recipe = catalog.get("research_deep_dive").unwrap();
        RecipeCatalog::validate_parameters(recipe, &serde_json::json!({"topic": "x"})).unwrap();
    }
}
