use actix_web::web;

use crate::modules::conversation::handle::{self, Backend};

/// Fixed segments (`/stats`, `/lookup`, `/image`) are registered ahead of the
/// `/{conversation_id}` routes so they are never parsed as ids.
pub fn configure<K: Backend>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/conversations")
            .service(
                web::resource("")
                    .route(web::post().to(handle::start_conversation::<K>))
                    .route(web::get().to(handle::list_conversations::<K>)),
            )
            .service(web::resource("/stats").route(web::get().to(handle::message_stats::<K>)))
            .service(
                web::resource("/lookup")
                    .route(web::get().to(handle::find_active_conversation::<K>)),
            )
            .service(web::resource("/image").route(web::post().to(handle::start_with_image::<K>)))
            .service(
                web::resource("/{conversation_id}")
                    .route(web::get().to(handle::get_conversation::<K>))
                    .route(web::delete().to(handle::delete_conversation::<K>)),
            )
            .service(
                web::resource("/{conversation_id}/messages")
                    .route(web::get().to(handle::list_messages::<K>))
                    .route(web::post().to(handle::send_message::<K>)),
            )
            .service(
                web::resource("/{conversation_id}/messages/image")
                    .route(web::post().to(handle::send_image_message::<K>)),
            )
            .service(
                web::resource("/{conversation_id}/read")
                    .route(web::put().to(handle::mark_as_read::<K>)),
            ),
    );
}
