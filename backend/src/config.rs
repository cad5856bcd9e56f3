use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use lambda_http::tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    DynamoDb,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "dynamodb" | "dynamo" => Ok(Self::DynamoDb),
            other => Err(format!("unknown storage backend `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageBackend {
    Local,
    S3,
}

impl FromStr for ImageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            other => Err(format!("unknown image backend `{other}`")),
        }
    }
}

/// Bootstrap admin account, created at startup when missing.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Base64 encoded HS256 secret.
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub storage: StorageBackend,
    pub dynamodb_endpoint: Option<String>,
    pub aws_region: String,
    pub images: ImageBackend,
    pub upload_dir: PathBuf,
    pub s3_bucket: Option<String>,
    pub cors_origins: Vec<String>,
    pub scrypt_log_n: u8,
    pub admin: Option<AdminSeed>,
}

impl Config {
    pub fn load() -> Result<Self, String> {
        if let Ok(path) = dotenvy::dotenv() {
            info!("Loaded environment from {}", path.display());
        }

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| "JWT_SECRET must be set".to_string())?;
        let admin = match (env::var("ADMIN_EMAIL"), env::var("ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(AdminSeed {
                name: env::var("ADMIN_NAME").unwrap_or_else(|_| "Administrator".to_string()),
                email,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            port: try_load("PORT", "4000")?,
            jwt_secret,
            jwt_expiration_hours: try_load("JWT_EXPIRATION_HOURS", "168")?,
            storage: try_load("STORAGE_BACKEND", "memory")?,
            dynamodb_endpoint: env::var("DYNAMODB_ENDPOINT").ok(),
            aws_region: try_load("AWS_REGION", "us-east-1")?,
            images: try_load("IMAGE_BACKEND", "local")?,
            upload_dir: try_load::<String>("UPLOAD_DIR", "uploads")?.into(),
            s3_bucket: env::var("S3_BUCKET").ok(),
            cors_origins: try_load::<String>(
                "CORS_ORIGINS",
                "http://localhost:3000,http://localhost:5173",
            )?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
            scrypt_log_n: try_load("SCRYPT_LOG_N", "15")?,
            admin,
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, String>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        format!("invalid value for {key}: {e}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backends_parse_case_insensitively() {
        assert_eq!("DynamoDB".parse(), Ok(StorageBackend::DynamoDb));
        assert_eq!("memory".parse(), Ok(StorageBackend::Memory));
        assert_eq!("S3".parse(), Ok(ImageBackend::S3));
        assert!("postgres".parse::<StorageBackend>().is_err());
    }
}
