use std::env;

use crate::services::ledger::AwardSchedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// In-process tables; data is lost on restart. Local development only.
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Self::Memory,
            _ => Self::Postgres,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,

    pub jwt_secret: String,
    pub jwt_access_ttl_secs: i64,
    pub jwt_refresh_ttl_secs: i64,

    // Brain Bucks economy
    pub task_completion_award: i64,
    pub memory_award: i64,
    pub today_task_limit: i64,
}

impl Config {
    pub fn from_env() -> Self {
        let storage_backend = StorageBackend::parse(
            &env::var("STORAGE_BACKEND").unwrap_or_else(|_| "postgres".into()),
        );
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            panic!("DATABASE_URL must be set when STORAGE_BACKEND=postgres");
        }

        Self {
            storage_backend,
            database_url,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .expect("PORT must be a number"),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".into()),

            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            jwt_access_ttl_secs: env::var("JWT_ACCESS_TTL_SECS")
                .unwrap_or_else(|_| "900".into())
                .parse()
                .expect("JWT_ACCESS_TTL_SECS must be a number"),
            jwt_refresh_ttl_secs: env::var("JWT_REFRESH_TTL_SECS")
                .unwrap_or_else(|_| "604800".into())
                .parse()
                .expect("JWT_REFRESH_TTL_SECS must be a number"),

            task_completion_award: positive_or(env::var("TASK_COMPLETION_AWARD").ok(), 5),
            memory_award: positive_or(env::var("MEMORY_AWARD").ok(), 5),
            today_task_limit: positive_or(env::var("TODAY_TASK_LIMIT").ok(), 3),
        }
    }

    pub fn awards(&self) -> AwardSchedule {
        AwardSchedule {
            task_completion: self.task_completion_award,
            memory_logged: self.memory_award,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Defaults with a fixed secret and the in-memory backend.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            storage_backend: StorageBackend::Memory,
            database_url: None,
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: "http://localhost:5173".into(),
            jwt_secret: "test-secret-do-not-use".into(),
            jwt_access_ttl_secs: 900,
            jwt_refresh_ttl_secs: 3600,
            task_completion_award: 5,
            memory_award: 5,
            today_task_limit: 3,
        }
    }
}

fn positive_or(raw: Option<String>, default: i64) -> i64 {
    raw.and_then(|v| v.parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}
