use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter, FromJsonQueryResult};
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(32))")]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    #[sea_orm(string_value = "cloud_services")]
    CloudServices,
    #[sea_orm(string_value = "analytics")]
    Analytics,
    #[sea_orm(string_value = "marketing")]
    Marketing,
    #[sea_orm(string_value = "security")]
    Security,
    #[sea_orm(string_value = "productivity")]
    Productivity,
    #[sea_orm(string_value = "communication")]
    Communication,
    #[sea_orm(string_value = "other")]
    Other,
}

impl ProductCategory {
    /// Label shown in the storefront.
    pub fn label(&self) -> &'static str {
        match self {
            ProductCategory::CloudServices => "Cloud Services",
            ProductCategory::Analytics => "Analytics",
            ProductCategory::Marketing => "Marketing",
            ProductCategory::Security => "Security",
            ProductCategory::Productivity => "Productivity",
            ProductCategory::Communication => "Communication",
            ProductCategory::Other => "Other",
        }
    }
}

impl std::fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    #[sea_orm(string_value = "available")]
    Available,
    #[sea_orm(string_value = "coming_soon")]
    ComingSoon,
    #[sea_orm(string_value = "discontinued")]
    Discontinued,
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Availability::Available => write!(f, "available"),
            Availability::ComingSoon => write!(f, "coming_soon"),
            Availability::Discontinued => write!(f, "discontinued"),
        }
    }
}

/// JSON-encoded list of short strings (features, tags).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct StringList(pub Vec<String>);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub description: String,
    pub image: String,
    #[sea_orm(unique)]
    pub url: String,
    pub category: ProductCategory,
    /// Prices are stored in cents.
    pub price_monthly: i64,
    pub price_yearly: i64,
    #[sea_orm(column_type = "Json")]
    pub features: StringList,
    pub is_popular: bool,
    #[sea_orm(column_type = "Double")]
    pub rating: f64,
    pub reviews: i64,
    #[sea_orm(column_type = "Json")]
    pub tags: StringList,
    pub availability: Availability,
    pub is_active: bool,
    pub trial_days: i32,
    pub max_users: Option<i32>,
    pub storage: Option<String>,
    pub support: Option<String>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn can_subscribe(&self) -> bool {
        self.is_active && self.availability == Availability::Available
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::subscriptions::Entity")]
    Subscriptions,
}

impl Related<super::subscriptions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscriptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
