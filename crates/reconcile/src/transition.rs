use medley_timeline::{MessageBody, MessageKind, StreamMessage};

/// What the reconciler must do to a view node for one message update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewTransition {
    Unchanged,
    Patch,
    Remount,
}

type MediaPredicate = fn(&MessageBody, &MessageBody) -> bool;

/// Classifies one update of a previously rendered message.
///
/// Remounting rebuilds interactive controls and discards focus/selection state,
/// so it is reserved for shape changes: a role or kind flip, or the kind's
/// primary media field resolving or changing. Everything else (progress ticks,
/// task-id display text, error text) patches in place.
pub fn classify(previous: &StreamMessage, next: &StreamMessage) -> ViewTransition {
    if previous.role != next.role || previous.kind() != next.kind() {
        return ViewTransition::Remount;
    }

    if media_predicate_for(next.kind())(&previous.body, &next.body) {
        return ViewTransition::Remount;
    }

    if previous == next {
        return ViewTransition::Unchanged;
    }

    ViewTransition::Patch
}

fn media_predicate_for(kind: MessageKind) -> MediaPredicate {
    match kind {
        MessageKind::Generate => generate_media_changed,
        MessageKind::Upscale => upscale_media_changed,
        MessageKind::Pedit => pedit_media_changed,
        MessageKind::Video => video_media_changed,
        MessageKind::Deconstruct => deconstruct_media_changed,
        MessageKind::Suno => suno_media_changed,
        MessageKind::Youtube => youtube_media_changed,
    }
}

fn generate_media_changed(previous: &MessageBody, next: &MessageBody) -> bool {
    match (previous, next) {
        (
            MessageBody::Generate {
                grid_image_url: previous,
            },
            MessageBody::Generate {
                grid_image_url: next,
            },
        ) => previous != next,
        _ => true,
    }
}

fn upscale_media_changed(previous: &MessageBody, next: &MessageBody) -> bool {
    match (previous, next) {
        (
            MessageBody::Upscale {
                upscaled_image_url: previous,
                ..
            },
            MessageBody::Upscale {
                upscaled_image_url: next,
                ..
            },
        ) => previous != next,
        _ => true,
    }
}

fn pedit_media_changed(previous: &MessageBody, next: &MessageBody) -> bool {
    match (previous, next) {
        (
            MessageBody::Pedit {
                image_urls: previous,
            },
            MessageBody::Pedit { image_urls: next },
        ) => previous != next,
        _ => true,
    }
}

fn video_media_changed(previous: &MessageBody, next: &MessageBody) -> bool {
    match (previous, next) {
        (
            MessageBody::Video {
                video_url: previous,
            },
            MessageBody::Video { video_url: next },
        ) => previous != next,
        _ => true,
    }
}

fn deconstruct_media_changed(previous: &MessageBody, next: &MessageBody) -> bool {
    match (previous, next) {
        (
            MessageBody::Deconstruct {
                description: previous,
            },
            MessageBody::Deconstruct { description: next },
        ) => previous != next,
        _ => true,
    }
}

fn suno_media_changed(previous: &MessageBody, next: &MessageBody) -> bool {
    match (previous, next) {
        (
            MessageBody::Suno {
                audio_url: previous_audio,
                lyrics: previous_lyrics,
            },
            MessageBody::Suno {
                audio_url: next_audio,
                lyrics: next_lyrics,
            },
        ) => previous_audio != next_audio || previous_lyrics != next_lyrics,
        _ => true,
    }
}

fn youtube_media_changed(previous: &MessageBody, next: &MessageBody) -> bool {
    match (previous, next) {
        (
            MessageBody::Youtube {
                video_url: previous_url,
                video_ref: previous_video,
                audio_ref: previous_audio,
                subtitle_ref: previous_subtitle,
            },
            MessageBody::Youtube {
                video_url: next_url,
                video_ref: next_video,
                audio_ref: next_audio,
                subtitle_ref: next_subtitle,
            },
        ) => {
            previous_url != next_url
                || previous_video != next_video
                || previous_audio != next_audio
                || previous_subtitle != next_subtitle
        }
        _ => true,
    }
}
