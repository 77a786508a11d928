use serde::{Deserialize, Serialize};

/// ERP record for one catalog item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub no: String,
    pub inventory: i64,
    pub unit_price: f64,
    pub description: String,
    pub item_category_code: String,
    pub product_model: String,
    pub specifications: String,
    pub warranty: String,
}

/// OData collection envelope
#[derive(Debug, Deserialize)]
pub struct ODataItems {
    #[serde(default)]
    pub value: Vec<ApiItem>,
}

/// Item entity as exposed by the Business Central page
#[derive(Debug, Deserialize)]
pub struct ApiItem {
    #[serde(rename = "No", default)]
    pub no: String,
    #[serde(rename = "Inventory", default)]
    pub inventory: f64,
    #[serde(rename = "Unit_Price", default)]
    pub unit_price: f64,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Item_Category_Code", default)]
    pub item_category_code: String,
    #[serde(rename = "Product_Model", default)]
    pub product_model: String,
    #[serde(rename = "Technical_Specifications", default)]
    pub technical_specifications: String,
    #[serde(rename = "Warranty_Period", default)]
    pub warranty_period: String,
}

impl From<ApiItem> for ProductDetails {
    fn from(item: ApiItem) -> Self {
        Self {
            no: item.no,
            inventory: item.inventory as i64,
            unit_price: item.unit_price,
            description: item.description,
            item_category_code: item.item_category_code,
            product_model: item.product_model,
            specifications: item.technical_specifications,
            warranty: item.warranty_period,
        }
    }
}
