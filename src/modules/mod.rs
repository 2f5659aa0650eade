pub mod user {
    pub mod schema;
    pub mod repository;
    pub mod repository_pg;
    pub mod cache;
}

pub mod post {
    pub mod schema;
    pub mod repository;
    pub mod repository_pg;
}

pub mod file_upload;

pub mod message {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_pg;
}

pub mod conversation {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_pg;
    pub mod resolver;
    pub mod service;
    pub mod handle;
    pub mod route;
}

// client-side reconciliation, driven by whoever embeds the service
#[allow(dead_code)]
pub mod sync {
    pub mod cache;
    pub mod poller;
}
