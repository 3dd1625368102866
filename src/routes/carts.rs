use std::collections::HashMap;

use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;
use validator::Validate;

use crate::{
    api::weather,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::{BranchScope, CurrentUser},
    cart::{Cart, CartLine, SaleUnit, round_cents},
    middleware,
    models::{
        CartEntity, CartItemEntity, CreateCartEntity, CreateCartItemEntity, CreateSaleEntity,
        CreateSaleItemEntity, MedicineEntity, SaleEntity, SaleItemEntity,
    },
    schema::{branches, cart_items, carts, medicines, sale_items, sales},
};

/// Defines the point-of-sale cart routes of the current branch.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/carts",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(create_cart))
            .routes(utoipa_axum::routes!(get_my_carts))
            .routes(utoipa_axum::routes!(get_cart))
            .routes(utoipa_axum::routes!(delete_cart))
            .routes(utoipa_axum::routes!(add_cart_item))
            .routes(utoipa_axum::routes!(remove_cart_item))
            .routes(utoipa_axum::routes!(checkout_cart))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::authorization,
            )),
    )
}

#[derive(Deserialize, Validate, ToSchema, Clone)]
pub(crate) struct CartItemReq {
    pub medicine_id: Uuid,
    #[validate(range(min = 1, max = 10000, message = "Quantity must be between 1 and 10000"))]
    pub quantity: i32,
    #[serde(default)]
    pub unit: SaleUnit,
}

#[derive(Deserialize, Validate, ToSchema)]
pub(crate) struct CreateCartReq {
    #[serde(default)]
    #[validate]
    pub items: Vec<CartItemReq>,
}

#[derive(Serialize, ToSchema)]
pub(crate) struct CartRes {
    pub cart: CartEntity,
    pub cart_items: Vec<CartItemEntity>,
    pub total_price: f64,
}

#[derive(Serialize, ToSchema)]
pub(crate) struct CheckoutRes {
    pub sale: SaleEntity,
    pub items: Vec<SaleItemEntity>,
    pub receipt_url: String,
}

fn cart_res(cart: CartEntity, cart_items: Vec<CartItemEntity>) -> Result<CartRes, AppError> {
    let total_price = round_cents(Cart::from_items(&cart_items)?.total());
    Ok(CartRes {
        cart,
        cart_items,
        total_price,
    })
}

pub(crate) fn receipt_url(sale_id: Uuid) -> String {
    format!("/sales/{sale_id}/receipt")
}

/// The caller's cart in the current branch, or 404.
async fn find_cart(
    conn: &mut AsyncPgConnection,
    id: i32,
    user: &CurrentUser,
    scope: &BranchScope,
) -> Result<CartEntity, AppError> {
    let cart = carts::table
        .find(id)
        .filter(carts::owner_uid.eq(&user.uid))
        .filter(carts::pharmacy_id.eq(&scope.pharmacy_id))
        .filter(carts::branch_name.eq(&scope.branch_name))
        .get_result(conn)
        .await?;
    Ok(cart)
}

async fn get_cart_items(conn: &mut AsyncPgConnection, cart_id: i32) -> Result<Vec<CartItemEntity>, AppError> {
    let items = cart_items::table
        .filter(cart_items::cart_id.eq(cart_id))
        .order_by(cart_items::id.asc())
        .get_results(conn)
        .await
        .context("Failed to get cart items")?;
    Ok(items)
}

/// Snapshots the requested medicine into a cart line.
async fn load_cart_line(
    conn: &mut AsyncPgConnection,
    scope: &BranchScope,
    item: &CartItemReq,
) -> Result<CartLine, AppError> {
    let medicine: MedicineEntity = medicines::table
        .find(item.medicine_id)
        .filter(medicines::pharmacy_id.eq(&scope.pharmacy_id))
        .filter(medicines::branch_name.eq(&scope.branch_name))
        .get_result(conn)
        .await
        .optional()
        .context("Failed to get medicine")?
        .ok_or_else(|| AppError::BadRequest(format!("Medicine {} not found", item.medicine_id)))?;

    Ok(CartLine::new(&medicine, item.quantity, item.unit)?)
}

fn cart_item_row(cart_id: i32, line: &CartLine) -> CreateCartItemEntity {
    CreateCartItemEntity {
        cart_id,
        medicine_id: line.medicine_id,
        medicine_name: line.name.clone(),
        medicine_type: line.medicine_type.as_str().to_string(),
        unit: line.unit.as_str().to_string(),
        quantity: line.quantity,
        price_per_unit: line.price_per_unit,
        tablets_per_box: line.tablets_per_box,
    }
}

/// The lines of a cart about to be sold; an empty cart cannot be checked out.
fn checkout_lines(items: &[CartItemEntity]) -> Result<Cart, AppError> {
    let cart = Cart::from_items(items)?;
    if cart.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }
    Ok(cart)
}

/// The conditional stock update matched no row: not enough pieces left.
fn ensure_stock_taken(updated: usize, name: &str) -> Result<(), AppError> {
    if updated == 0 {
        return Err(AppError::Conflict(format!("Insufficient stock for {name}")));
    }
    Ok(())
}

fn ensure_cart_removed(deleted: usize) -> Result<(), AppError> {
    if deleted != 1 {
        return Err(AppError::Conflict("Cart was already checked out".into()));
    }
    Ok(())
}

/// Create a cart, optionally with initial items.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    request_body = CreateCartReq,
    responses(
        (status = 200, description = "Cart created successfully", body = StdResponse<CartRes, String>)
    )
)]
async fn create_cart(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CreateCartReq>,
) -> Result<impl IntoResponse, AppError> {
    let scope = user.branch_scope()?;
    body.validate()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let owner_uid = user.uid.clone();
    let (cart, cart_items) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let cart: CartEntity = diesel::insert_into(carts::table)
                    .values(CreateCartEntity {
                        owner_uid,
                        pharmacy_id: scope.pharmacy_id.clone(),
                        branch_name: scope.branch_name.clone(),
                    })
                    .returning(CartEntity::as_returning())
                    .get_result(conn)
                    .await?;

                let mut lines = Cart::default();
                for item in &body.items {
                    lines.add(load_cart_line(conn, &scope, item).await?)?;
                }

                if lines.is_empty() {
                    return Ok((cart, Vec::new()));
                }

                let rows: Vec<CreateCartItemEntity> = lines
                    .lines()
                    .iter()
                    .map(|line| cart_item_row(cart.id, line))
                    .collect();

                let cart_items: Vec<CartItemEntity> = diesel::insert_into(cart_items::table)
                    .values(rows)
                    .returning(CartItemEntity::as_returning())
                    .get_results(conn)
                    .await?;

                Ok::<(CartEntity, Vec<CartItemEntity>), AppError>((cart, cart_items))
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(cart_res(cart, cart_items)?),
        message: Some("Cart created successfully"),
    })
}

/// Fetch the caller's carts in the current branch.
#[utoipa::path(
    get,
    path = "/my-carts",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get my carts successfully", body = StdResponse<Vec<CartRes>, String>)
    )
)]
async fn get_my_carts(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let scope = user.branch_scope()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let carts: Vec<CartEntity> = carts::table
        .filter(carts::owner_uid.eq(&user.uid))
        .filter(carts::pharmacy_id.eq(&scope.pharmacy_id))
        .filter(carts::branch_name.eq(&scope.branch_name))
        .order_by(carts::created_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get my carts")?;

    let cart_ids: Vec<i32> = carts.iter().map(|cart| cart.id).collect();

    let items: Vec<CartItemEntity> = cart_items::table
        .filter(cart_items::cart_id.eq_any(&cart_ids))
        .order_by(cart_items::id.asc())
        .get_results(conn)
        .await
        .context("Failed to get cart items")?;

    let mut group: HashMap<i32, Vec<CartItemEntity>> = HashMap::new();
    for item in items {
        group.entry(item.cart_id).or_default().push(item);
    }

    let carts_with_items = carts
        .into_iter()
        .map(|cart| {
            let cart_items = group.remove(&cart.id).unwrap_or_default();
            cart_res(cart, cart_items)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(StdResponse {
        data: Some(carts_with_items),
        message: Some("Get my carts successfully"),
    })
}

/// Fetch one of the caller's carts with its lines and total.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    params(("id" = i32, Path, description = "Cart ID")),
    responses(
        (status = 200, description = "Get cart successfully", body = StdResponse<CartRes, String>)
    )
)]
async fn get_cart(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let scope = user.branch_scope()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = find_cart(conn, id, &user, &scope).await?;
    let cart_items = get_cart_items(conn, cart.id).await?;

    Ok(StdResponse {
        data: Some(cart_res(cart, cart_items)?),
        message: Some("Get cart successfully"),
    })
}

/// Discard a cart and its lines.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    params(("id" = i32, Path, description = "Cart ID")),
    responses(
        (status = 200, description = "Cart Deleted", body = StdResponse<CartEntity, String>)
    )
)]
async fn delete_cart(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let scope = user.branch_scope()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = find_cart(conn, id, &user, &scope).await?;

    let deleted_cart: CartEntity = diesel::delete(carts::table.find(cart.id))
        .returning(CartEntity::as_returning())
        .get_result(conn)
        .await?;

    Ok(StdResponse {
        data: Some(deleted_cart),
        message: Some("Cart Deleted"),
    })
}

/// Append a line to a cart. Every add creates a new line.
#[utoipa::path(
    post,
    path = "/{id}/items",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    params(("id" = i32, Path, description = "Cart ID")),
    request_body = CartItemReq,
    responses(
        (status = 200, description = "Item added to cart", body = StdResponse<CartRes, String>)
    )
)]
async fn add_cart_item(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<CartItemReq>,
) -> Result<impl IntoResponse, AppError> {
    let scope = user.branch_scope()?;
    body.validate()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = find_cart(conn, id, &user, &scope).await?;
    let mut cart_items = get_cart_items(conn, cart.id).await?;

    let mut lines = Cart::from_items(&cart_items)?;
    let line = load_cart_line(conn, &scope, &body).await?;
    let row = cart_item_row(cart.id, &line);
    lines.add(line)?;

    let added: CartItemEntity = diesel::insert_into(cart_items::table)
        .values(row)
        .returning(CartItemEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to add cart item")?;
    cart_items.push(added);

    Ok(StdResponse {
        data: Some(cart_res(cart, cart_items)?),
        message: Some("Item added to cart"),
    })
}

/// Remove a single line from a cart.
#[utoipa::path(
    delete,
    path = "/{id}/items/{item_id}",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Cart ID"),
        ("item_id" = i32, Path, description = "Cart item ID")
    ),
    responses(
        (status = 200, description = "Item removed from cart", body = StdResponse<CartRes, String>)
    )
)]
async fn remove_cart_item(
    Path((id, item_id)): Path<(i32, i32)>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let scope = user.branch_scope()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = find_cart(conn, id, &user, &scope).await?;

    let removed = diesel::delete(
        cart_items::table
            .filter(cart_items::id.eq(item_id))
            .filter(cart_items::cart_id.eq(cart.id)),
    )
    .execute(conn)
    .await
    .context("Failed to remove cart item")?;

    if removed == 0 {
        return Err(AppError::NotFound);
    }

    let cart_items = get_cart_items(conn, cart.id).await?;

    Ok(StdResponse {
        data: Some(cart_res(cart, cart_items)?),
        message: Some("Item removed from cart"),
    })
}

/// Turn a cart into a sale: stock is taken, the sale recorded and the cart removed.
#[utoipa::path(
    post,
    path = "/{id}/checkout",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    params(("id" = i32, Path, description = "Cart ID")),
    responses(
        (status = 200, description = "Checkout completed", body = StdResponse<CheckoutRes, String>)
    )
)]
async fn checkout_cart(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let scope = user.branch_scope()?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let city: Option<String> = branches::table
        .find((&scope.pharmacy_id, &scope.branch_name))
        .select(branches::city)
        .first(conn)
        .await
        .optional()
        .context("Failed to get branch city")?;

    // The weather lookup overlaps with the ownership check.
    let weather_lookup = async {
        match &city {
            Some(city) => {
                weather::try_get_current_weather(state.http_client.clone(), &state.api_urls, city)
                    .await
            }
            None => None,
        }
    };
    let (weather, cart) =
        futures::future::join(weather_lookup, find_cart(conn, id, &user, &scope)).await;
    let cart = cart?;

    let cashier_uid = user.uid.clone();
    let (sale, items) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                // Concurrent checkouts of the same cart queue up here.
                let cart: CartEntity = carts::table
                    .find(cart.id)
                    .filter(carts::owner_uid.eq(&cashier_uid))
                    .for_update()
                    .get_result(conn)
                    .await?;
                let items = get_cart_items(conn, cart.id).await?;
                let cart_lines = checkout_lines(&items)?;

                for (medicine_id, (name, pieces)) in cart_lines.pieces_by_medicine()? {
                    let updated = diesel::update(
                        medicines::table
                            .filter(medicines::id.eq(medicine_id))
                            .filter(medicines::pharmacy_id.eq(&scope.pharmacy_id))
                            .filter(medicines::branch_name.eq(&scope.branch_name))
                            .filter(medicines::quantity.ge(pieces)),
                    )
                    .set((
                        medicines::quantity.eq(medicines::quantity - pieces),
                        medicines::updated_at.eq(diesel::dsl::now),
                    ))
                    .execute(conn)
                    .await?;

                    ensure_stock_taken(updated, &name)?;
                }

                let (temperature_c, weather_condition) = match weather {
                    Some(snapshot) => (Some(snapshot.temperature_c), snapshot.condition),
                    None => (None, None),
                };

                let sale: SaleEntity = diesel::insert_into(sales::table)
                    .values(CreateSaleEntity {
                        pharmacy_id: scope.pharmacy_id.clone(),
                        branch_name: scope.branch_name.clone(),
                        cashier_uid,
                        total: round_cents(cart_lines.total()),
                        temperature_c,
                        weather_condition,
                    })
                    .returning(SaleEntity::as_returning())
                    .get_result(conn)
                    .await?;

                let rows: Vec<CreateSaleItemEntity> = cart_lines
                    .lines()
                    .iter()
                    .map(|line| CreateSaleItemEntity {
                        sale_id: sale.id,
                        medicine_id: line.medicine_id,
                        medicine_name: line.name.clone(),
                        unit: line.unit.as_str().to_string(),
                        quantity: line.quantity,
                        pieces: line.pieces(),
                        unit_price: line.price_per_unit,
                        line_total: round_cents(line.line_total()),
                    })
                    .collect();

                let sale_items: Vec<SaleItemEntity> = diesel::insert_into(sale_items::table)
                    .values(rows)
                    .returning(SaleItemEntity::as_returning())
                    .get_results(conn)
                    .await?;

                let deleted = diesel::delete(carts::table.find(cart.id))
                    .execute(conn)
                    .await?;
                ensure_cart_removed(deleted)?;

                Ok::<(SaleEntity, Vec<SaleItemEntity>), AppError>((sale, sale_items))
            })
        })
        .await?;

    tracing::info!(
        sale_id = %sale.id,
        branch = %sale.branch_name,
        "Checked out cart {} for ${:.2}",
        id,
        sale.total
    );

    Ok(StdResponse {
        data: Some(CheckoutRes {
            receipt_url: receipt_url(sale.id),
            sale,
            items,
        }),
        message: Some("Checkout completed"),
    })
}
