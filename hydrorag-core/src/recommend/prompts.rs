//! Prompt text for the recommendation stages

pub const SEARCH_QUERY_SYSTEM: &str = "You are a water treatment engineer. Condense the \
water analysis and the customer's request into a single search query for a library of \
equipment manuals and design guides. Name the problem parameters and the treatment \
technologies involved. Reply with the query only.";

pub const SUMMARY_SYSTEM: &str = "You are a water treatment engineer. Describe the water \
analysis in plain prose for a system designer: state every measured parameter with its \
unit, and point out values that exceed drinking water limits or that threaten reverse \
osmosis membranes (hardness, iron, manganese, silica, turbidity).";

pub const RECOMMENDATION_SYSTEM: &str = "You are a water treatment system design expert. \
Using only products and practices supported by the documentation excerpts, design a \
complete treatment train for the customer.\n\n\
Respond with a JSON object in a ```json fenced block, exactly in this shape:\n\
{\"pretreatment\": [{\"product_description\": \"...\", \"product_name\": \"...\", \"model_number\": \"...\"}], \
\"RO\": [...], \"postreatment\": [...]}\n\
Use double quotes and no trailing commas. After the block, explain the design in \
markdown: why each stage is needed and how it addresses the water analysis.";

pub fn search_query_prompt(user_query: &str, record_json: &str) -> String {
    format!(
        "Customer request: {}\n\nWater analysis (JSON):\n{}",
        user_query, record_json
    )
}

pub fn summary_prompt(record_json: &str) -> String {
    format!("Water analysis (JSON):\n{}", record_json)
}

pub fn recommendation_prompt(user_query: &str, summary: &str, context: &str) -> String {
    format!(
        "Customer request: {}\n\n\
Water analysis summary:\n{}\n\n\
Documentation excerpts:\n{}",
        user_query, summary, context
    )
}
