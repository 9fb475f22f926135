pub mod coordinator;
pub mod session;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;
