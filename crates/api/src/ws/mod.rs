pub mod handler;
pub mod heartbeat;
pub mod manager;
pub mod pump;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
pub use pump::{start_change_pump, start_presence_pump};
