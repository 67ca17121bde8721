#[derive(clap::Parser, Debug, Clone)]
#[command(name = "passbind", version, about = "Passport-to-address binding service")]
pub struct Config {
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// TCP address to listen on.
    #[arg(long, env = "PASSBIND_LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: std::net::SocketAddr,

    /// Directory for the file-backed device store. Defaults to the
    /// platform data dir when unset.
    #[arg(long, env = "PASSBIND_DATA_DIR")]
    pub data_dir: Option<std::path::PathBuf>,

    /// Postgres connection string; selects the relational store backend
    /// when present, the JSON file backend otherwise.
    #[arg(long, env = "POSTGRES_URL")]
    pub postgres_url: Option<String>,

    /// Only accept the Apple-spec nonce form SHA-256(authData || SHA-256(challenge)).
    /// The default additionally accepts SHA-256(authData || challenge) for
    /// clients that pre-hash the challenge themselves.
    #[arg(long, env = "PASSBIND_STRICT_NONCE")]
    pub strict_nonce: bool,

    /// Expected App ID (`TEAMID.bundle.id`). When set, attestations must
    /// carry rpIdHash == SHA-256 of this value.
    #[arg(long, env = "PASSBIND_APP_ID")]
    pub app_id: Option<String>,

    #[arg(long, env = "PRIMUS_APP_ID")]
    pub primus_app_id: Option<String>,

    #[arg(long, env = "PRIMUS_APP_SECRET", hide_env_values = true)]
    pub primus_app_secret: Option<String>,

    /// Base URL of the Primus attestor gateway.
    #[arg(
        long,
        env = "PRIMUS_BASE_URL",
        default_value = "https://api.primuslabs.xyz"
    )]
    pub primus_base_url: String,
}
