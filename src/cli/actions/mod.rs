pub mod server;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: Option<String>,
        frontend_url: String,
        google_client_id: Option<String>,
        google_issuer: String,
        google_jwks_url: String,
        dev_mail_preview: bool,
    },
}
