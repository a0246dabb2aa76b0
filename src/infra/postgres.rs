pub mod pending_event_repo;
