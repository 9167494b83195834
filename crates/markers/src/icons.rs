/// Fixed sprites for records carrying no explicit icon name.
pub const INSTANCE_SPRITE: &str = "sprites/instance.png";
pub const SHORTCUT_SPRITE: &str = "sprites/agility.png";
pub const TRAVEL_SPRITE: &str = "sprites/travel.png";

/// Content-addressed icon URL for an explicitly named icon.
///
/// The image store shards files by the first two hex characters of the hash
/// of their full file name, so `"Varrock"` resolves to
/// `<base>/<hh>/Varrock.png`.
pub fn hashed_icon_url(base_url: &str, icon_name: &str) -> String {
    let file = format!("{icon_name}.png");
    let hash = blake3::hash(file.as_bytes()).to_hex();
    let prefix = &hash.as_str()[..2];
    format!("{}/{prefix}/{file}", base_url.trim_end_matches('/'))
}

/// Fallback sprite when no icon name is present, in priority order.
pub fn fallback_sprite(actually_instance: bool, agility: bool) -> &'static str {
    if actually_instance {
        INSTANCE_SPRITE
    } else if agility {
        SHORTCUT_SPRITE
    } else {
        TRAVEL_SPRITE
    }
}
