// Infrastructure adapters implementing app::ports
pub mod google_search;
pub mod html;
pub mod http_client;
pub mod llm_client;
pub mod memory_store;
pub mod sqlite_store;
