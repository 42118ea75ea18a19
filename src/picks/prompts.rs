//! Prompt templates for weekly pick generation.

use crate::types::PickCategory;

pub const SYSTEM_PROMPT: &str = "You are a disciplined market analyst competing against other \
analysts in a weekly stock-picking competition. You are scored only on whether each pick reaches \
its target price before it expires. Respond with a JSON array and nothing else.";

/// Universe description and price band for a category.
fn universe(category: PickCategory) -> (&'static str, &'static str) {
    match category {
        PickCategory::Stock => (
            "US-listed equities on NYSE or NASDAQ with a market cap above $2B",
            "any price above $5",
        ),
        PickCategory::PennyStock => (
            "US-listed small-cap equities with meaningful daily volume",
            "a current price under $5",
        ),
        PickCategory::Crypto => (
            "crypto assets in the top 100 by market cap, quoted in USD (use the bare symbol, e.g. BTC)",
            "any price",
        ),
    }
}

/// Build the user prompt asking for `count` picks in `category` for `week`.
pub fn pick_prompt(category: PickCategory, count: usize, week: i64, horizon_days: i64) -> String {
    let (universe, band) = universe(category);
    format!(
        "Competition week {week}. Choose exactly {count} picks from {universe}, restricted to {band}.\n\
         Each pick expires {horizon_days} days from now and wins only if the price reaches the target \
         by then. Set target below entry to predict a decline.\n\n\
         Return ONLY a JSON array with this schema:\n\
         [\n  {{\n    \"ticker\": \"SYMBOL\",\n    \"confidence\": 0-100,\n    \"entry_price\": number,\n    \
         \"target_price\": number,\n    \"reasoning\": \"one or two sentences\"\n  }}\n]"
    )
}
