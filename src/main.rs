use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use entraide::{app, db};

#[derive(OpenApi)]
#[openapi(
    paths(
        entraide::routes::health::health,
        entraide::routes::auth::register,
        entraide::routes::auth::login,
        entraide::routes::auth::me,
        entraide::routes::auth::logout,
        entraide::routes::association_auth::register,
        entraide::routes::association_auth::login,
        entraide::routes::users::list_users,
        entraide::routes::users::deleted_users,
        entraide::routes::users::get_user,
        entraide::routes::users::update_user,
        entraide::routes::users::delete_user,
        entraide::routes::users::restore_user,
        entraide::routes::users::force_delete_user,
        entraide::routes::associations::list_associations,
        entraide::routes::associations::get_association,
        entraide::routes::associations::update_association,
        entraide::routes::associations::delete_association,
        entraide::routes::associations::deleted_associations,
        entraide::routes::associations::restore_association,
        entraide::routes::associations::force_delete_association,
        entraide::routes::associations::list_members,
        entraide::routes::associations::add_member,
        entraide::routes::associations::remove_member,
        entraide::routes::offers::create_offer,
        entraide::routes::offers::donor_offers,
        entraide::routes::offers::association_offers,
        entraide::routes::offers::update_offer_status,
        entraide::routes::aid_requests::create_request,
        entraide::routes::aid_requests::recipient_requests,
        entraide::routes::aid_requests::association_requests,
        entraide::routes::aid_requests::update_request_status,
        entraide::routes::chat::send_to_association,
        entraide::routes::chat::send_to_user,
        entraide::routes::chat::conversation,
        entraide::routes::chat::user_messages,
        entraide::routes::chat::association_messages,
        entraide::routes::chat::mark_read,
    ),
    components(schemas(
        entraide::models::user::User,
        entraide::models::user::UserRole,
        entraide::models::user::RegisterRequest,
        entraide::models::user::LoginRequest,
        entraide::models::user::UserUpdateRequest,
        entraide::models::user::AuthResponse,
        entraide::models::association::Association,
        entraide::models::association::AssociationRegisterRequest,
        entraide::models::association::AssociationLoginRequest,
        entraide::models::association::AssociationUpdateRequest,
        entraide::models::association::AssociationAuthResponse,
        entraide::models::membership::MemberRole,
        entraide::models::membership::AssociationMember,
        entraide::models::membership::AddMemberRequest,
        entraide::models::offer::Offer,
        entraide::models::offer::DonationStatus,
        entraide::models::offer::OfferCreateRequest,
        entraide::models::offer::StatusUpdateRequest,
        entraide::models::aid_request::AidRequest,
        entraide::models::aid_request::AidRequestCreateRequest,
        entraide::models::message::Message,
        entraide::models::message::SendMessageRequest,
        entraide::routes::auth::MeResponse,
        entraide::routes::health::HealthResponse,
        entraide::routes::MessageResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "User authentication"),
        (name = "AssociationAuth", description = "Association authentication"),
        (name = "Users", description = "User administration"),
        (name = "Associations", description = "Association directory and management"),
        (name = "Offers", description = "Donation offers"),
        (name = "AidRequests", description = "Recipient aid requests"),
        (name = "Chat", description = "User/association messaging"),
        (name = "Health", description = "Service health")
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("opaque")
                    .build(),
            ),
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let pool = db::init().await?;
    let app = app::create_app(pool).await?;

    let app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let port = std::env::var("APP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8000);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
