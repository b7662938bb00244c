// Watchpost: change detection and de-duplicated notification for watched
// content sources.
//
// This is the library root. Each module corresponds to one subsystem of the
// poll → diff → notify path.

pub mod cache;
pub mod card;
pub mod config;
pub mod db;
pub mod keys;
pub mod notify;
pub mod poller;
pub mod state;
pub mod status;
pub mod verify;
