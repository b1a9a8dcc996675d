use crate::billing;
use crate::entities::{
    Availability, BillingCycle, ProductCategory, StringList, product_entity as products,
};
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::auth_service::require_admin;
use chrono::Utc;
use sea_orm::sea_query::{Alias, Expr, Func, LikeExpr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Unchanged, ColumnTrait, Condition,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select,
    Set, TransactionTrait,
};

#[derive(Clone)]
pub struct ProductService {
    pool: DatabaseConnection,
    currency: String,
}

impl ProductService {
    pub fn new(pool: DatabaseConnection, currency: impl Into<String>) -> Self {
        Self {
            pool,
            currency: currency.into(),
        }
    }

    pub async fn create_product(
        &self,
        admin_id: i64,
        req: CreateProductRequest,
    ) -> AppResult<ProductResponse> {
        require_admin(&self.pool, admin_id).await?;

        let now = Utc::now();
        let draft = products::Model {
            id: 0,
            name: req.name.trim().to_string(),
            description: req.description.trim().to_string(),
            image: req.image.trim().to_string(),
            url: req.url.trim().to_string(),
            category: req.category,
            price_monthly: req.price_monthly,
            price_yearly: req.price_yearly,
            features: StringList(req.features),
            is_popular: req.is_popular,
            rating: req.rating,
            reviews: req.reviews,
            tags: StringList(req.tags),
            availability: req.availability.unwrap_or(Availability::Available),
            is_active: true,
            trial_days: req.trial_days,
            max_users: req.max_users,
            storage: req.storage,
            support: req.support,
            created_by: Some(admin_id),
            updated_by: None,
            created_at: Some(now),
            updated_at: Some(now),
        };
        validate_product(&draft)?;
        self.ensure_url_free(&draft.url, None).await?;

        let product = active_from(draft).insert(&self.pool).await?;
        log::info!("Product {} created by admin {admin_id}", product.id);
        Ok(ProductResponse::from(product))
    }

    /// Partial update. Pricing and range rules are checked against the merged record.
    pub async fn update_product(
        &self,
        admin_id: i64,
        product_id: i64,
        req: UpdateProductRequest,
    ) -> AppResult<ProductResponse> {
        require_admin(&self.pool, admin_id).await?;
        let existing = self.find_model(product_id).await?;

        let mut merged = existing.clone();
        if let Some(v) = req.name {
            merged.name = v.trim().to_string();
        }
        if let Some(v) = req.description {
            merged.description = v.trim().to_string();
        }
        if let Some(v) = req.image {
            merged.image = v.trim().to_string();
        }
        if let Some(v) = req.url {
            merged.url = v.trim().to_string();
        }
        if let Some(v) = req.category {
            merged.category = v;
        }
        if let Some(v) = req.price_monthly {
            merged.price_monthly = v;
        }
        if let Some(v) = req.price_yearly {
            merged.price_yearly = v;
        }
        if let Some(v) = req.features {
            merged.features = StringList(v);
        }
        if let Some(v) = req.is_popular {
            merged.is_popular = v;
        }
        if let Some(v) = req.rating {
            merged.rating = v;
        }
        if let Some(v) = req.reviews {
            merged.reviews = v;
        }
        if let Some(v) = req.tags {
            merged.tags = StringList(v);
        }
        if let Some(v) = req.availability {
            merged.availability = v;
        }
        if let Some(v) = req.is_active {
            merged.is_active = v;
        }
        if let Some(v) = req.trial_days {
            merged.trial_days = v;
        }
        if req.max_users.is_some() {
            merged.max_users = req.max_users;
        }
        if req.storage.is_some() {
            merged.storage = req.storage;
        }
        if req.support.is_some() {
            merged.support = req.support;
        }
        merged.updated_by = Some(admin_id);
        merged.updated_at = Some(Utc::now());

        validate_product(&merged)?;
        if merged.url != existing.url {
            self.ensure_url_free(&merged.url, Some(product_id)).await?;
        }

        let mut am = active_from(merged);
        am.id = Unchanged(product_id);
        let product = am.update(&self.pool).await?;
        log::info!("Product {product_id} updated by admin {admin_id}");
        Ok(ProductResponse::from(product))
    }

    /// Soft delete: the row stays for existing subscriptions but leaves the catalog.
    pub async fn delete_product(&self, admin_id: i64, product_id: i64) -> AppResult<ProductResponse> {
        require_admin(&self.pool, admin_id).await?;
        let existing = self.find_model(product_id).await?;

        let mut am: products::ActiveModel = existing.into();
        am.is_active = Set(false);
        am.updated_by = Set(Some(admin_id));
        am.updated_at = Set(Some(Utc::now()));
        let product = am.update(&self.pool).await?;
        log::info!("Product {product_id} deactivated by admin {admin_id}");
        Ok(ProductResponse::from(product))
    }

    pub async fn get_product(&self, product_id: i64) -> AppResult<ProductResponse> {
        let product = self.find_model(product_id).await?;
        if !product.is_active {
            return Err(AppError::NotFound("Product not found".to_string()));
        }
        Ok(ProductResponse::from(product))
    }

    pub async fn list_products(
        &self,
        query: &ProductQuery,
    ) -> AppResult<PaginatedResponse<ProductResponse>> {
        let page = query.pagination.page();
        let page_size = query.pagination.page_size_or(DEFAULT_PRODUCT_PAGE_SIZE);

        let mut base = products::Entity::find();
        if !query.include_inactive {
            base = base.filter(products::Column::IsActive.eq(true));
        }
        if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = contains_pattern(&term.to_lowercase());
            base = base.filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col(products::Column::Name)))
                            .like(pattern.clone()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col(products::Column::Description)))
                            .like(pattern.clone()),
                    )
                    .add(Expr::expr(Func::lower(tags_as_text())).like(pattern)),
            );
        }
        if let Some(category) = query.category {
            base = base.filter(products::Column::Category.eq(category));
        }
        if let Some(popular) = query.is_popular {
            base = base.filter(products::Column::IsPopular.eq(popular));
        }
        if let Some(min) = query.min_price {
            base = base.filter(products::Column::PriceMonthly.gte(min));
        }
        if let Some(max) = query.max_price {
            base = base.filter(products::Column::PriceMonthly.lte(max));
        }
        let tags: Vec<&str> = query
            .tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if !tags.is_empty() {
            // tags are stored as a JSON array of strings; match any listed tag, ignoring case
            let any_tag = tags.into_iter().fold(Condition::any(), |cond, tag| {
                let quoted = format!("\"{}\"", tag.to_lowercase());
                cond.add(Expr::expr(Func::lower(tags_as_text())).like(contains_pattern(&quoted)))
            });
            base = base.filter(any_tag);
        }

        let total = base.clone().count(&self.pool).await?;
        let items = listing_order(base)
            .limit(page_size)
            .offset(query.pagination.offset(DEFAULT_PRODUCT_PAGE_SIZE))
            .all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(
            items.into_iter().map(Into::into).collect(),
            page,
            page_size,
            total,
        ))
    }

    pub async fn find_by_category(
        &self,
        category: ProductCategory,
    ) -> AppResult<Vec<ProductResponse>> {
        let list = listing_order(
            products::Entity::find()
                .filter(products::Column::Category.eq(category))
                .filter(products::Column::IsActive.eq(true)),
        )
        .all(&self.pool)
        .await?;
        Ok(list.into_iter().map(Into::into).collect())
    }

    pub async fn find_popular(&self, limit: Option<u64>) -> AppResult<Vec<ProductResponse>> {
        let list = products::Entity::find()
            .filter(products::Column::IsPopular.eq(true))
            .filter(products::Column::IsActive.eq(true))
            .order_by_desc(products::Column::Rating)
            .order_by_desc(products::Column::Reviews)
            .order_by_asc(products::Column::Id)
            .limit(limit.unwrap_or(DEFAULT_POPULAR_LIMIT).clamp(1, MAX_PAGE_SIZE))
            .all(&self.pool)
            .await?;
        Ok(list.into_iter().map(Into::into).collect())
    }

    pub async fn subscription_options(&self, product_id: i64) -> AppResult<SubscriptionOptions> {
        let product = self.find_model(product_id).await?;
        if !product.is_active {
            return Err(AppError::NotFound("Product not found".to_string()));
        }
        SubscriptionOptions::for_product(&product, &self.currency).ok_or_else(|| {
            AppError::ValidationError("Product not available for subscription".to_string())
        })
    }

    /// Upsert the baseline catalog keyed by url. Missing rows are inserted,
    /// existing ones are only reactivated. Returns the active catalog.
    pub async fn seed_catalog(&self) -> AppResult<Vec<ProductResponse>> {
        let now = Utc::now();
        let rows: Vec<products::ActiveModel> = baseline_catalog()
            .into_iter()
            .map(|mut p| {
                p.created_at = Some(now);
                p.updated_at = Some(now);
                active_from(p)
            })
            .collect();
        let seeded = rows.len();

        let txn = self.pool.begin().await?;
        products::Entity::insert_many(rows)
            .on_conflict(
                OnConflict::column(products::Column::Url)
                    .update_columns([products::Column::IsActive, products::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&txn)
            .await?;
        txn.commit().await?;
        log::info!("Catalog seeded: {seeded} baseline products upserted");

        let list = listing_order(products::Entity::find().filter(products::Column::IsActive.eq(true)))
            .all(&self.pool)
            .await?;
        Ok(list.into_iter().map(Into::into).collect())
    }

    async fn find_model(&self, product_id: i64) -> AppResult<products::Model> {
        products::Entity::find_by_id(product_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))
    }

    async fn ensure_url_free(&self, url: &str, except: Option<i64>) -> AppResult<()> {
        let mut q = products::Entity::find().filter(products::Column::Url.eq(url));
        if let Some(id) = except {
            q = q.filter(products::Column::Id.ne(id));
        }
        if q.one(&self.pool).await?.is_some() {
            return Err(AppError::Conflict("Product URL already exists".to_string()));
        }
        Ok(())
    }
}

fn listing_order(q: Select<products::Entity>) -> Select<products::Entity> {
    q.order_by_desc(products::Column::IsPopular)
        .order_by_desc(products::Column::Rating)
        .order_by_asc(products::Column::Id)
}

fn tags_as_text() -> sea_orm::sea_query::SimpleExpr {
    Func::cast_as(Expr::col(products::Column::Tags), Alias::new("TEXT")).into()
}

/// `%needle%` with LIKE wildcards in the needle escaped.
fn contains_pattern(needle: &str) -> LikeExpr {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    LikeExpr::new(escaped).escape('\\')
}

fn active_from(p: products::Model) -> products::ActiveModel {
    products::ActiveModel {
        id: NotSet,
        name: Set(p.name),
        description: Set(p.description),
        image: Set(p.image),
        url: Set(p.url),
        category: Set(p.category),
        price_monthly: Set(p.price_monthly),
        price_yearly: Set(p.price_yearly),
        features: Set(p.features),
        is_popular: Set(p.is_popular),
        rating: Set(p.rating),
        reviews: Set(p.reviews),
        tags: Set(p.tags),
        availability: Set(p.availability),
        is_active: Set(p.is_active),
        trial_days: Set(p.trial_days),
        max_users: Set(p.max_users),
        storage: Set(p.storage),
        support: Set(p.support),
        created_by: Set(p.created_by),
        updated_by: Set(p.updated_by),
        created_at: Set(p.created_at),
        updated_at: Set(p.updated_at),
    }
}

fn validate_product(p: &products::Model) -> AppResult<()> {
    let invalid = |msg: &str| -> AppResult<()> { Err(AppError::ValidationError(msg.to_string())) };

    if p.name.is_empty() || p.name.chars().count() > 200 {
        return invalid("Product name must be between 1 and 200 characters");
    }
    if p.description.is_empty() {
        return invalid("Product description is required");
    }
    if p.image.is_empty() {
        return invalid("Product image is required");
    }
    if !(p.url.starts_with("https://") || p.url.starts_with("http://")) {
        return invalid("Product URL must be an http(s) URL");
    }
    billing::validate_pricing(p.price_monthly, p.price_yearly)?;
    if !(0.0..=5.0).contains(&p.rating) {
        return invalid("Rating must be between 0 and 5");
    }
    if p.reviews < 0 {
        return invalid("Reviews must not be negative");
    }
    if p.trial_days < 0 {
        return invalid("Trial days must not be negative");
    }
    if i64::from(p.trial_days) >= BillingCycle::Monthly.interval_days() {
        return invalid("Trial must be shorter than one monthly billing period");
    }
    if p.max_users.is_some_and(|m| m < 1) {
        return invalid("Max users must be at least 1");
    }
    Ok(())
}

fn strings(items: &[&str]) -> StringList {
    StringList(items.iter().map(|s| s.to_string()).collect())
}

#[allow(clippy::too_many_arguments)]
fn baseline_product(
    name: &str,
    description: &str,
    slug: &str,
    url_path: &str,
    category: ProductCategory,
    (price_monthly, price_yearly): (i64, i64),
    features: &[&str],
    (rating, reviews): (f64, i64),
    tags: &[&str],
) -> products::Model {
    products::Model {
        id: 0,
        name: name.to_string(),
        description: description.to_string(),
        image: format!("https://picsum.photos/seed/{slug}/800/600"),
        url: format!("https://example.com/{url_path}"),
        category,
        price_monthly,
        price_yearly,
        features: strings(features),
        is_popular: false,
        rating,
        reviews,
        tags: strings(tags),
        availability: Availability::Available,
        is_active: true,
        trial_days: 0,
        max_users: None,
        storage: None,
        support: None,
        created_by: None,
        updated_by: None,
        created_at: None,
        updated_at: None,
    }
}

pub(crate) fn baseline_catalog() -> Vec<products::Model> {
    let mut cloud = baseline_product(
        "Premium Cloud Storage",
        "Secure cloud storage solution with advanced encryption and seamless file synchronization across all your devices.",
        "cloud-storage",
        "cloud-storage",
        ProductCategory::CloudServices,
        (1299, 12999),
        &[
            "1TB secure cloud storage",
            "End-to-end encryption",
            "Cross-platform sync",
            "File versioning",
            "24/7 customer support",
            "Mobile app access",
        ],
        (4.8, 1247),
        &["Storage", "Security", "Sync"],
    );
    cloud.is_popular = true;

    vec![
        cloud,
        baseline_product(
            "AI-Powered Analytics Dashboard",
            "Transform your data into actionable insights with our advanced AI analytics platform designed for modern businesses.",
            "analytics",
            "analytics",
            ProductCategory::Analytics,
            (2999, 29999),
            &[
                "Real-time data visualization",
                "AI-powered insights",
                "Custom dashboard creation",
                "Data export capabilities",
                "Team collaboration tools",
                "API integration",
            ],
            (4.6, 892),
            &["AI", "Analytics", "Dashboard"],
        ),
        baseline_product(
            "Professional Email Marketing Suite",
            "Create, send, and track email campaigns with our comprehensive marketing automation platform.",
            "email-marketing",
            "email-marketing",
            ProductCategory::Marketing,
            (1999, 19999),
            &[
                "Drag-and-drop email builder",
                "Automated campaign sequences",
                "Advanced segmentation",
                "A/B testing tools",
                "Detailed analytics",
                "CRM integration",
            ],
            (4.7, 2156),
            &["Email", "Marketing", "Automation"],
        ),
        baseline_product(
            "Secure VPN Service",
            "Protect your online privacy and access global content with our high-speed, secure VPN service.",
            "vpn-service",
            "vpn",
            ProductCategory::Security,
            (999, 9999),
            &[
                "Unlimited bandwidth",
                "200+ server locations",
                "No-logs policy",
                "Kill switch protection",
                "Multi-device support",
                "24/7 customer support",
            ],
            (4.5, 3421),
            &["VPN", "Privacy", "Security"],
        ),
        baseline_product(
            "Project Management Pro",
            "Streamline your team's workflow with our comprehensive project management and collaboration platform.",
            "project-management",
            "project-management",
            ProductCategory::Productivity,
            (2499, 24999),
            &[
                "Task and project tracking",
                "Team collaboration tools",
                "Time tracking",
                "Resource management",
                "Custom workflows",
                "Integration with 100+ apps",
            ],
            (4.9, 1876),
            &["Project Management", "Collaboration", "Productivity"],
        ),
        baseline_product(
            "Advanced Video Conferencing",
            "Host professional meetings with crystal-clear video, advanced features, and enterprise-grade security.",
            "video-conferencing",
            "video-conferencing",
            ProductCategory::Communication,
            (1599, 15999),
            &[
                "HD video and audio",
                "Screen sharing",
                "Recording capabilities",
                "Virtual backgrounds",
                "Breakout rooms",
                "Meeting transcription",
            ],
            (4.4, 963),
            &["Video", "Communication", "Meetings"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_catalog_is_valid() {
        let catalog = baseline_catalog();
        assert_eq!(catalog.len(), 6);
        for p in &catalog {
            validate_product(p).unwrap();
        }
        let mut urls: Vec<_> = catalog.iter().map(|p| p.url.as_str()).collect();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), 6);
        assert_eq!(catalog.iter().filter(|p| p.is_popular).count(), 1);
    }

    #[test]
    fn test_validate_product_rules() {
        let base = baseline_catalog().remove(0);

        let mut p = base.clone();
        p.price_yearly = p.price_monthly * 12;
        assert!(validate_product(&p).is_err());

        let mut p = base.clone();
        p.rating = 5.5;
        assert!(validate_product(&p).is_err());

        let mut p = base.clone();
        p.max_users = Some(0);
        assert!(validate_product(&p).is_err());

        let mut p = base.clone();
        p.url = "ftp://example.com/x".to_string();
        assert!(validate_product(&p).is_err());

        let mut p = base.clone();
        p.trial_days = 30;
        assert!(validate_product(&p).is_err());

        let mut p = base;
        p.trial_days = 14;
        p.max_users = Some(5);
        assert!(validate_product(&p).is_ok());
    }
}
