//! Text rendering of a recipe for the outbound message.

use crate::domain::types::Recipe;

/// Render a recipe as a plain-text chat message.
///
/// Missing nutrition fields render as `N/A`.
pub fn format_recipe_message(recipe: &Recipe) -> String {
    format!(
        "Healthy recipe: {title}\n\
         \n\
         Ingredients:\n\
         {ingredients}\n\
         \n\
         Instructions:\n\
         {instructions}\n\
         \n\
         Nutrition:\n\
         - Calories: {calories} kcal\n\
         - Protein: {protein} g\n\
         - Carbs: {carbs} g\n\
         - Fat: {fat} g",
        title = recipe.title,
        ingredients = recipe.ingredients.join(", "),
        instructions = recipe.instructions,
        calories = or_na(recipe.calories),
        protein = or_na(recipe.protein),
        carbs = or_na(recipe.carbs),
        fat = or_na(recipe.fat),
    )
}

fn or_na(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}
