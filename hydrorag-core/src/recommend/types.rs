use crate::providers::erp::ProductDetails;
use serde::{Deserialize, Serialize};

/// One recommended item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_description: String,
    pub product_name: String,
    pub model_number: String,
}

impl Product {
    /// Stand-in emitted when no recommendation could be produced
    pub fn placeholder() -> Self {
        Self {
            product_description: "Error in processing".to_string(),
            product_name: "Error".to_string(),
            model_number: "N/A".to_string(),
        }
    }
}

/// Products per treatment stage. The field names are part of the model's
/// output contract, misspelling included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub pretreatment: Vec<Product>,
    #[serde(rename = "RO")]
    pub ro: Vec<Product>,
    pub postreatment: Vec<Product>,
}

impl Recommendation {
    pub fn placeholder() -> Self {
        Self {
            pretreatment: vec![Product::placeholder()],
            ro: vec![Product::placeholder()],
            postreatment: vec![Product::placeholder()],
        }
    }

    /// Every product across the three stages
    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.pretreatment
            .iter()
            .chain(self.ro.iter())
            .chain(self.postreatment.iter())
    }
}

/// A product with its ERP record, when the catalog knows it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedProduct {
    #[serde(flatten)]
    pub product: Product,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub details: Option<ProductDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedCart {
    pub pretreatment: Vec<EnrichedProduct>,
    #[serde(rename = "RO")]
    pub ro: Vec<EnrichedProduct>,
    pub postreatment: Vec<EnrichedProduct>,
}

/// Result of `process_and_enrich`
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedRecommendation {
    pub cart: EnrichedCart,
    pub explanation: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recommendation_field_names() {
        let rec = Recommendation {
            pretreatment: vec![],
            ro: vec![Product {
                product_description: "500 GPD skid".to_string(),
                product_name: "RO Unit".to_string(),
                model_number: "RO-500".to_string(),
            }],
            postreatment: vec![],
        };

        let value = serde_json::to_value(&rec).unwrap();

        assert_eq!(value["RO"][0]["model_number"], "RO-500");
        assert!(value.get("postreatment").is_some());
        assert!(value.get("ro").is_none());
    }

    #[test]
    fn test_recommendation_requires_all_stages() {
        let result = serde_json::from_value::<Recommendation>(json!({
            "pretreatment": [],
            "RO": []
        }));

        assert!(result.is_err());
    }

    #[test]
    fn test_placeholder() {
        let rec = Recommendation::placeholder();

        assert_eq!(rec.products().count(), 3);
        assert!(rec.products().all(|p| p.product_name == "Error"
            && p.product_description == "Error in processing"
            && p.model_number == "N/A"));
    }

    #[test]
    fn test_enriched_product_flattens_details() {
        let product = EnrichedProduct {
            product: Product {
                product_description: "Cartridge filter".to_string(),
                product_name: "CF".to_string(),
                model_number: "CF-10".to_string(),
            },
            details: Some(ProductDetails {
                no: "CF-10".to_string(),
                inventory: 12,
                unit_price: 35.0,
                description: "10 inch housing".to_string(),
                item_category_code: "FILTER".to_string(),
                product_model: "CF-10".to_string(),
                specifications: "5 micron".to_string(),
                warranty: "6 months".to_string(),
            }),
        };

        let value = serde_json::to_value(&product).unwrap();

        assert_eq!(value["product_description"], "Cartridge filter");
        assert_eq!(value["unit_price"], 35.0);
        assert_eq!(value["inventory"], 12);
    }

    #[test]
    fn test_enriched_product_without_details() {
        let product = EnrichedProduct {
            product: Product::placeholder(),
            details: None,
        };

        let value = serde_json::to_value(&product).unwrap();

        assert_eq!(value, json!({
            "product_description": "Error in processing",
            "product_name": "Error",
            "model_number": "N/A"
        }));
    }
}
