/// OpenAPI documentation for the Taskline Messaging Service
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Taskline Messaging Service API",
        version = "1.0.0",
        description = "Real-time messaging, presence, and delivery tracking between job posters and workers",
        contact(
            name = "Taskline Team",
            email = "support@taskline.dev"
        ),
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development server"),
        (url = "https://api.taskline.dev/messaging", description = "Production server"),
    ),
    tags(
        (name = "Health", description = "Service health checks"),
        (name = "Messages", description = "Message submit, read receipts, resend, delete"),
        (name = "Conversations", description = "History and unread counts"),
        (name = "Presence", description = "Online and typing state"),
        (name = "WebSocket", description = "Live events: message:new, message:status, typing:start, typing:stop, presence:online, presence:offline"),
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    pub fn title() -> &'static str {
        "Taskline Messaging Service"
    }

    pub fn openapi_json_path() -> &'static str {
        "/openapi.json"
    }
}
