mod startup;
mod state;

pub use startup::{serve, shutdown_signal, start};
pub use state::{AppState, Collaborators};
