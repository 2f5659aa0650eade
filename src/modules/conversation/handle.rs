use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpRequest};
use futures_util::TryStreamExt;
use uuid::Uuid;

use crate::{
    api::{error, success},
    middlewares::get_extensions,
    modules::{
        conversation::{
            model::{
                ConversationDetail, ConversationPage, ConversationQueryRequest, LookupQuery,
                MessageStats, StartConversationRequest, StartedConversation,
            },
            repository::ConversationRepository,
            repository_pg::ConversationPgRepository,
            service::{ConversationService, ImageTarget, ImageUpload},
        },
        file_upload::{BlobStore, LocalBlobStore},
        message::{
            model::{
                MarkReadResponse, MessagePage, MessageQueryRequest, MessageResponse,
                SendMessageRequest,
            },
            repository::MessageRepository,
            repository_pg::MessageRepositoryPg,
        },
        post::{repository::PostRepository, repository_pg::PostRepositoryPg},
        user::{
            cache::CachedUserRepository, repository::UserRepository,
            repository_pg::UserRepositoryPg,
        },
    },
    utils::{Claims, ValidatedJson, ValidatedQuery},
};

/// Largest text form field (caption, ids) read from a multipart body.
const MAX_FORM_FIELD_SIZE: usize = 8 * 1024;

/// Storage wiring the HTTP handlers run against.
pub trait Backend: 'static {
    type Conversations: ConversationRepository + Send + Sync + 'static;
    type Messages: MessageRepository + Send + Sync + 'static;
    type Posts: PostRepository + Send + Sync + 'static;
    type Users: UserRepository + Send + Sync + 'static;
    type Blobs: BlobStore + Send + Sync + 'static;
}

pub type ServiceOf<K> = ConversationService<
    <K as Backend>::Conversations,
    <K as Backend>::Messages,
    <K as Backend>::Posts,
    <K as Backend>::Users,
    <K as Backend>::Blobs,
>;

pub struct PgBackend;

impl Backend for PgBackend {
    type Conversations = ConversationPgRepository;
    type Messages = MessageRepositoryPg;
    type Posts = PostRepositoryPg;
    type Users = CachedUserRepository<UserRepositoryPg>;
    type Blobs = LocalBlobStore;
}

fn current_user(req: &HttpRequest) -> Result<Uuid, error::Error> {
    Ok(get_extensions::<Claims>(req)?.sub)
}

pub async fn start_conversation<K: Backend>(
    conversation_svc: web::Data<ServiceOf<K>>,
    body: ValidatedJson<StartConversationRequest>,
    req: HttpRequest,
) -> Result<success::Success<StartedConversation>, error::Error> {
    let user_id = current_user(&req)?;
    let body = body.0;

    let started = conversation_svc
        .start_conversation(
            user_id,
            body.other_user_id,
            body.post_id,
            body.initial_message,
            body.client_message_id,
        )
        .await?;

    Ok(success::Success::created(Some(started)).message("Conversation started"))
}

pub async fn list_conversations<K: Backend>(
    conversation_svc: web::Data<ServiceOf<K>>,
    query: ValidatedQuery<ConversationQueryRequest>,
    req: HttpRequest,
) -> Result<success::Success<ConversationPage>, error::Error> {
    let user_id = current_user(&req)?;

    let page = conversation_svc.list_conversations(user_id, query.0.page, query.0.limit).await?;

    Ok(success::Success::ok(Some(page)))
}

pub async fn message_stats<K: Backend>(
    conversation_svc: web::Data<ServiceOf<K>>,
    req: HttpRequest,
) -> Result<success::Success<MessageStats>, error::Error> {
    let user_id = current_user(&req)?;

    let stats = conversation_svc.message_stats(user_id).await?;

    Ok(success::Success::ok(Some(stats)))
}

/// `data` is null when the pair has no active conversation about the post yet.
pub async fn find_active_conversation<K: Backend>(
    conversation_svc: web::Data<ServiceOf<K>>,
    query: ValidatedQuery<LookupQuery>,
    req: HttpRequest,
) -> Result<success::Success<ConversationDetail>, error::Error> {
    let user_id = current_user(&req)?;

    let conversation = conversation_svc
        .find_active_conversation(user_id, query.0.other_user_id, query.0.post_id)
        .await?;

    Ok(success::Success::ok(conversation))
}

pub async fn start_with_image<K: Backend>(
    conversation_svc: web::Data<ServiceOf<K>>,
    payload: Multipart,
    req: HttpRequest,
) -> Result<success::Success<MessageResponse>, error::Error> {
    let user_id = current_user(&req)?;
    let form = ImageForm::read(payload, conversation_svc.max_image_size()).await?;

    let other_user_id =
        form.other_user_id.ok_or_else(|| error::Error::bad_request("otherUserId is required"))?;
    let target = ImageTarget::Post { other_user_id, post_id: form.post_id };

    let message = conversation_svc.send_image_message(target, user_id, form.into_upload()?).await?;

    Ok(success::Success::created(Some(message)).message("Image sent"))
}

pub async fn get_conversation<K: Backend>(
    conversation_svc: web::Data<ServiceOf<K>>,
    conversation_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<ConversationDetail>, error::Error> {
    let user_id = current_user(&req)?;

    let conversation = conversation_svc.get_conversation(*conversation_id, user_id).await?;

    Ok(success::Success::ok(Some(conversation)))
}

pub async fn list_messages<K: Backend>(
    conversation_svc: web::Data<ServiceOf<K>>,
    conversation_id: web::Path<Uuid>,
    query: ValidatedQuery<MessageQueryRequest>,
    req: HttpRequest,
) -> Result<success::Success<MessagePage>, error::Error> {
    let user_id = current_user(&req)?;

    let page = conversation_svc
        .list_messages(*conversation_id, user_id, query.0.page, query.0.limit)
        .await?;

    Ok(success::Success::ok(Some(page)))
}

pub async fn send_message<K: Backend>(
    conversation_svc: web::Data<ServiceOf<K>>,
    conversation_id: web::Path<Uuid>,
    body: ValidatedJson<SendMessageRequest>,
    req: HttpRequest,
) -> Result<success::Success<MessageResponse>, error::Error> {
    let user_id = current_user(&req)?;
    let body = body.0;

    let message = conversation_svc
        .send_message(*conversation_id, user_id, body.content, body.client_message_id)
        .await?;

    Ok(success::Success::created(Some(message)))
}

pub async fn send_image_message<K: Backend>(
    conversation_svc: web::Data<ServiceOf<K>>,
    conversation_id: web::Path<Uuid>,
    payload: Multipart,
    req: HttpRequest,
) -> Result<success::Success<MessageResponse>, error::Error> {
    let user_id = current_user(&req)?;
    let form = ImageForm::read(payload, conversation_svc.max_image_size()).await?;
    let target = ImageTarget::Conversation(*conversation_id);

    let message = conversation_svc.send_image_message(target, user_id, form.into_upload()?).await?;

    Ok(success::Success::created(Some(message)).message("Image sent"))
}

pub async fn mark_as_read<K: Backend>(
    conversation_svc: web::Data<ServiceOf<K>>,
    conversation_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<MarkReadResponse>, error::Error> {
    let user_id = current_user(&req)?;

    let updated_count = conversation_svc.mark_as_read(*conversation_id, user_id).await?;

    Ok(success::Success::ok(Some(MarkReadResponse { updated_count })))
}

pub async fn delete_conversation<K: Backend>(
    conversation_svc: web::Data<ServiceOf<K>>,
    conversation_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<()>, error::Error> {
    let user_id = current_user(&req)?;

    conversation_svc.delete_conversation(*conversation_id, user_id).await?;

    Ok(success::Success::ok(None).message("Conversation deleted"))
}

/// Fields of an image upload form. Unknown fields are drained and ignored.
#[derive(Debug, Default)]
struct ImageForm {
    image: Option<(Vec<u8>, String)>,
    caption: Option<String>,
    client_message_id: Option<Uuid>,
    other_user_id: Option<Uuid>,
    post_id: Option<Uuid>,
}

impl ImageForm {
    async fn read(mut payload: Multipart, max_image_size: usize) -> Result<Self, error::Error> {
        let mut form = ImageForm::default();

        while let Some(mut field) = payload.try_next().await.map_err(invalid_body)? {
            let name = field.name().map(str::to_string).unwrap_or_default();

            match name.as_str() {
                "image" => {
                    let mime_type = field_mime_type(&field);
                    let bytes = read_bytes(&mut field, max_image_size).await?;
                    form.image = Some((bytes, mime_type));
                }
                "caption" => form.caption = Some(read_text(&mut field, &name).await?),
                "clientMessageId" => {
                    form.client_message_id = Some(read_uuid(&mut field, &name).await?)
                }
                "otherUserId" => form.other_user_id = Some(read_uuid(&mut field, &name).await?),
                "postId" => form.post_id = Some(read_uuid(&mut field, &name).await?),
                _ => while field.try_next().await.map_err(invalid_body)?.is_some() {},
            }
        }

        Ok(form)
    }

    fn into_upload(self) -> Result<ImageUpload, error::Error> {
        let (bytes, mime_type) =
            self.image.ok_or_else(|| error::Error::bad_request("Image file is required"))?;

        Ok(ImageUpload {
            bytes,
            mime_type,
            caption: self.caption,
            client_message_id: self.client_message_id,
        })
    }
}

fn invalid_body(e: actix_multipart::MultipartError) -> error::Error {
    error::Error::bad_request(format!("Invalid multipart body: {}", e))
}

/// Declared content type, else a guess from the file name.
fn field_mime_type(field: &Field) -> String {
    match field.content_type() {
        Some(mime) if mime.essence_str() != "application/octet-stream" => {
            mime.essence_str().to_string()
        }
        _ => field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .and_then(|name| mime_guess::from_path(name).first())
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string()),
    }
}

/// Reads at most one byte past `limit` so oversize uploads still fail validation
/// without being buffered whole.
async fn read_bytes(field: &mut Field, limit: usize) -> Result<Vec<u8>, error::Error> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(invalid_body)? {
        bytes.extend_from_slice(&chunk);
        if bytes.len() > limit {
            bytes.truncate(limit + 1);
            break;
        }
    }
    Ok(bytes)
}

async fn read_text(field: &mut Field, name: &str) -> Result<String, error::Error> {
    let bytes = read_bytes(field, MAX_FORM_FIELD_SIZE).await?;
    if bytes.len() > MAX_FORM_FIELD_SIZE {
        return Err(error::Error::bad_request(format!(
            "{} must be at most {} bytes",
            name, MAX_FORM_FIELD_SIZE
        )));
    }
    String::from_utf8(bytes)
        .map_err(|_| error::Error::bad_request(format!("{} must be valid UTF-8", name)))
}

async fn read_uuid(field: &mut Field, name: &str) -> Result<Uuid, error::Error> {
    let text = read_text(field, name).await?;
    Uuid::parse_str(text.trim())
        .map_err(|_| error::Error::bad_request(format!("{} must be a valid UUID", name)))
}

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;
