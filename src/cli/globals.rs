use secrecy::SecretString;

#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub redis_url: Option<String>,
    pub jwt_secret: SecretString,
    pub jwt_refresh_secret: SecretString,
    pub frontend_base_url: String,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            redis_url: None,
            jwt_secret: SecretString::default(),
            jwt_refresh_secret: SecretString::default(),
            frontend_base_url,
        }
    }

    pub fn set_secrets(&mut self, jwt_secret: SecretString, jwt_refresh_secret: SecretString) {
        self.jwt_secret = jwt_secret;
        self.jwt_refresh_secret = jwt_refresh_secret;
    }
}
