pub mod backend;
pub mod chart;
pub mod history;
pub mod respond;
pub mod route;
pub mod schema;
pub mod sql;
pub mod workflow;
