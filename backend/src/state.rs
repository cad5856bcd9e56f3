use aws_config::{BehaviorVersion, Region, SdkConfig};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use lambda_http::{tracing, Error};

use crate::{
    config::{Config, ImageBackend, StorageBackend},
    images::ImageStore,
    models::user::{Role, User},
    store::{dynamo::DynamoStore, memory::MemoryStore, Database},
    utils::{create_userid, hash_password, normalize_email},
};

pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub images: ImageStore,
    pub jwt: (EncodingKey, DecodingKey, Header),
}

async fn aws_config(config: &Config) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.aws_region.clone()));
    if let Some(endpoint) = &config.dynamodb_endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    loader.load().await
}

fn jwt_keys(secret: &str) -> Result<(EncodingKey, DecodingKey, Header), Error> {
    Ok((
        EncodingKey::from_base64_secret(secret)?,
        DecodingKey::from_base64_secret(secret)?,
        Header::new(Algorithm::HS256),
    ))
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, Error> {
        let needs_aws =
            config.storage == StorageBackend::DynamoDb || config.images == ImageBackend::S3;
        let sdk = if needs_aws {
            Some(aws_config(&config).await)
        } else {
            None
        };

        let db = match (config.storage, &sdk) {
            (StorageBackend::DynamoDb, Some(sdk)) => {
                tracing::info!("Using DynamoDB storage");
                Database::Dynamo(DynamoStore::new(sdk))
            }
            _ => {
                tracing::warn!("Using in-memory storage, data is lost on restart");
                Database::Memory(MemoryStore::new())
            }
        };

        let images = match (config.images, &sdk) {
            (ImageBackend::S3, Some(sdk)) => {
                let bucket = config
                    .s3_bucket
                    .clone()
                    .ok_or("S3_BUCKET must be set when IMAGE_BACKEND=s3")?;
                ImageStore::s3(sdk, bucket)
            }
            _ => ImageStore::local(config.upload_dir.clone()),
        };

        let jwt = jwt_keys(&config.jwt_secret)?;
        let state = Self {
            config,
            db,
            images,
            jwt,
        };
        state.seed_admin().await?;
        Ok(state)
    }

    /// In-memory state for tests: temp upload dir and a cheap scrypt cost.
    #[cfg(test)]
    pub fn test() -> Result<Self, Error> {
        let upload_dir =
            std::env::temp_dir().join(format!("kitabyatra-test-{}", ulid::Ulid::new()));
        // base64 of "kitabyatra-test-secret-kitabyatra"
        let secret = "a2l0YWJ5YXRyYS10ZXN0LXNlY3JldC1raXRhYnlhdHJh".to_string();
        let config = Config {
            port: 0,
            jwt_secret: secret,
            jwt_expiration_hours: 1,
            storage: StorageBackend::Memory,
            dynamodb_endpoint: None,
            aws_region: "test".to_string(),
            images: ImageBackend::Local,
            upload_dir: upload_dir.clone(),
            s3_bucket: None,
            cors_origins: Vec::new(),
            scrypt_log_n: 4,
            admin: None,
        };

        Ok(Self {
            jwt: jwt_keys(&config.jwt_secret)?,
            config,
            db: Database::Memory(MemoryStore::new()),
            images: ImageStore::local(upload_dir),
        })
    }

    /// Creates the configured admin account when it does not exist yet.
    pub async fn seed_admin(&self) -> Result<(), Error> {
        let Some(seed) = &self.config.admin else {
            return Ok(());
        };
        let id = create_userid(&seed.email);
        if self.db.get::<User>(&id).await?.is_some() {
            tracing::info!("Admin account {} already exists", seed.email);
            return Ok(());
        }

        let password = hash_password(&seed.password, self.config.scrypt_log_n)?;
        let admin = User::new(
            id,
            seed.name.clone(),
            normalize_email(&seed.email),
            password,
            Role::Admin,
        );
        self.db.insert(&admin).await?;
        tracing::info!("Created admin account {}", admin.email);
        Ok(())
    }
}
