// HTTP surface of the session notification service

pub mod handlers;
pub mod routes;
pub mod state;
