//! Helper implementations for protocol payload types.

use crate::protocol::{MetadataUpdate, ServiceInfoField, TrackMetadata};

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl TrackMetadata {
    /// Merges only the fields present in the update. Empty-string fields
    /// never overwrite an existing value.
    pub fn merge_from(&mut self, update: &MetadataUpdate) {
        if let Some(artist) = non_empty(&update.artist) {
            self.artist = artist.to_string();
        }
        if let Some(album) = non_empty(&update.album) {
            self.album = album.to_string();
        }
        if let Some(title) = non_empty(&update.title) {
            self.title = title.to_string();
        }
        if let Some(track) = non_empty(&update.track) {
            self.title = track.to_string();
        }
        if let Some(image) = non_empty(&update.image) {
            self.thumbnail = image.to_string();
        }
    }
}

impl ServiceInfoField {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "loadedUrl" => Some(Self::LoadedUrl),
            "receivedUrl" => Some(Self::ReceivedUrl),
            "artist" => Some(Self::Artist),
            "album" => Some(Self::Album),
            "title" => Some(Self::Title),
            "thumbnail" => Some(Self::Thumbnail),
            "repeat" => Some(Self::Repeat),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_ignores_absent_and_empty_fields() {
        let mut metadata = TrackMetadata {
            artist: "Orbital".to_string(),
            album: "In Sides".to_string(),
            ..TrackMetadata::default()
        };
        metadata.merge_from(&MetadataUpdate {
            artist: Some(String::new()),
            title: Some("The Box".to_string()),
            ..MetadataUpdate::default()
        });
        assert_eq!(metadata.artist, "Orbital");
        assert_eq!(metadata.album, "In Sides");
        assert_eq!(metadata.title, "The Box");
    }

    #[test]
    fn test_merge_track_alias_sets_title() {
        let mut metadata = TrackMetadata::default();
        metadata.merge_from(&MetadataUpdate {
            track: Some("Halcyon".to_string()),
            ..MetadataUpdate::default()
        });
        assert_eq!(metadata.title, "Halcyon");
    }

    #[test]
    fn test_service_info_field_parses_known_keys_only() {
        assert_eq!(
            ServiceInfoField::from_key("loadedUrl"),
            Some(ServiceInfoField::LoadedUrl)
        );
        assert_eq!(
            ServiceInfoField::from_key("repeat"),
            Some(ServiceInfoField::Repeat)
        );
        assert_eq!(ServiceInfoField::from_key("bitrate"), None);
    }
}
