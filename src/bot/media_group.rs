//! Media-group coalescing.
//!
//! The platform splits a batch upload into one event per file, delivered in
//! no particular order. All files sharing a group id end up in a single
//! content row whose member list stays sorted by the sender-side message id.

use tracing::debug;

use crate::db::{ContentBody, GroupItem};
use crate::dialogue::TourDraftScratch;
use crate::engine::TurnCtx;
use crate::errors::{AppError, AppResult};
use crate::event::MediaItem;

/// How an incoming group file was absorbed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupAppend {
    /// First file of the group: a new content row was created.
    Created,
    /// The file joined an existing row.
    Merged,
    /// The row already held this file (platform re-delivery).
    Duplicate,
}

fn group_item(item: &MediaItem) -> GroupItem {
    GroupItem {
        kind: item.kind,
        file_id: item.file_id.clone(),
        ordinal: item.ordinal,
        caption: item.caption.clone(),
    }
}

/// Absorb one file of a media group into the open section.
///
/// Holds the content-append lock across the read-modify-write so files of
/// the same batch arriving as near-simultaneous events cannot race.
pub async fn store_grouped(
    ctx: &TurnCtx,
    draft: &mut TourDraftScratch,
    item: &MediaItem,
) -> AppResult<GroupAppend> {
    let section_id = draft
        .section_id
        .ok_or_else(|| AppError::Internal("media arrived with no open section".to_string()))?;
    let group_id = item
        .media_group_id
        .clone()
        .ok_or_else(|| AppError::Internal("grouped store of ungrouped media".to_string()))?;

    let _guard = ctx.services.content_lock.lock().await;

    match ctx.content().find_media_group(section_id, &group_id).await? {
        None => {
            let body = ContentBody::MediaGroup {
                group_id: group_id.clone(),
                items: vec![group_item(item)],
            };
            ctx.content()
                .append_content(section_id, draft.next_content_pos, &body)
                .await?;
            draft.next_content_pos += 1;
            debug!(
                section_id = section_id,
                group_id = group_id.as_str(),
                "Opened media-group row"
            );
            Ok(GroupAppend::Created)
        }
        Some(existing) => {
            let ContentBody::MediaGroup { group_id, mut items } = existing.body else {
                return Err(AppError::Internal(format!(
                    "content row {} is not a media group",
                    existing.id
                )));
            };
            if items
                .iter()
                .any(|g| g.ordinal == item.ordinal || g.file_id == item.file_id)
            {
                debug!(
                    group_id = group_id.as_str(),
                    ordinal = item.ordinal,
                    "Ignoring re-delivered group file"
                );
                return Ok(GroupAppend::Duplicate);
            }
            items.push(group_item(item));
            items.sort_by_key(|g| g.ordinal);
            ctx.content()
                .update_content_body(existing.id, &ContentBody::MediaGroup { group_id, items })
                .await?;
            Ok(GroupAppend::Merged)
        }
    }
}
