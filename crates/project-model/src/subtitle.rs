//! Automatic subtitle text derived from an audio file name.

/// Derive the default subtitle for an audio file.
///
/// `audio_03_the_first_line.mp3` becomes `the first line`: the extension is
/// dropped, then a leading `audio_<digits>` marker with an optional trailing
/// underscore, then underscores turn into spaces and the result is trimmed.
pub fn derive_subtitle(file_name: &str) -> String {
    let stem = strip_extension(file_name);
    let stem = strip_sequence_prefix(stem);
    stem.replace('_', " ").trim().to_string()
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) => {
            let ext = &name[dot + 1..];
            if ext.is_empty() || ext.contains('/') {
                name
            } else {
                &name[..dot]
            }
        }
        None => name,
    }
}

fn strip_sequence_prefix(stem: &str) -> &str {
    let Some(rest) = stem.strip_prefix("audio_") else {
        return stem;
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return stem;
    }
    let rest = &rest[digits..];
    rest.strip_prefix('_').unwrap_or(rest)
}
