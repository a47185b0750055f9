pub mod protocol;
pub mod rest;
pub mod state;
pub mod turn_task;
pub mod voice;
pub mod ws_handler;

// Re-export the main WebSocket handler to make it easily accessible
// to the binary that will build the web server router.
pub use rest::{
    create_session_handler, delete_session_handler, list_artifacts_handler,
    list_sessions_handler, list_turns_handler, rename_session_handler, upload_document_handler,
};
pub use ws_handler::ws_handler;
