pub mod exports;
pub mod patrol;
pub mod whitelist;
