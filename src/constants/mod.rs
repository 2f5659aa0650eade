pub struct Env {
    pub jwt_secret: String,
    pub database_url: String,
    pub redis_url: String,
    pub frontend_url: String,
    pub ip: String,
    pub port: u16,
    pub upload_dir: String,
    pub upload_base_url: String,
    pub max_image_size: usize,
    pub statement_timeout_ms: u64,
}

impl Env {
    fn new() -> Self {
        let jwt_secret = std::env::var("SECRET_KEY")
            .expect("SECRET_KEY must be set in .env file or environment variable");

        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set in .env file or environment variable");
        let redis_url = std::env::var("REDIS_URL")
            .expect("REDIS_URL must be set in .env file or environment variable");

        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let ip = std::env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .expect("PORT must be a valid u16 integer");

        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string());
        let upload_base_url =
            std::env::var("UPLOAD_BASE_URL").unwrap_or_else(|_| "/uploads".to_string());
        let max_image_size = std::env::var("MAX_IMAGE_SIZE")
            .unwrap_or_else(|_| (10 * 1024 * 1024).to_string())
            .parse::<usize>()
            .expect("MAX_IMAGE_SIZE must be a valid byte count");
        let statement_timeout_ms = std::env::var("STATEMENT_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u64>()
            .expect("STATEMENT_TIMEOUT_MS must be a valid u64 integer");

        Env {
            jwt_secret,
            database_url,
            redis_url,
            frontend_url,
            ip,
            port,
            upload_dir,
            upload_base_url,
            max_image_size,
            statement_timeout_ms,
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
