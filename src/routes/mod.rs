pub mod assistant;
pub mod branches;
pub mod carts;
pub mod forecasts;
pub mod manufacturers;
pub mod me;
pub mod medicines;
pub mod sales;
pub mod stock_requests;
