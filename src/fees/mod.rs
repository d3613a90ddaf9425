pub mod schedule;

pub use schedule::{net_price, net_price_f64, profit, profit_f64};
