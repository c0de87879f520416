use crate::error::ParseFault;
use crate::url_codec::{self, UrlPosition};

/// Playlist text being rewritten in place.
#[derive(Debug, Clone)]
pub struct ManifestDocument {
    text: String,
}

impl ManifestDocument {
    pub fn load(raw: &str) -> Self {
        Self {
            text: raw.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replaces the first occurrence of `url` with `replacement`.
    ///
    /// The URL is searched in its absolute, base-relative and literal forms in
    /// the current text, so spans replaced earlier in the pass are never hit.
    pub fn replace_url(
        &mut self,
        url: &str,
        literal: &str,
        manifest_url: &str,
        position: UrlPosition,
        replacement: &str,
    ) -> Result<(), ParseFault> {
        let located = url_codec::locate_url(&self.text, url, Some(literal), manifest_url, position)?;
        self.text
            .replace_range(located.start..located.end(), replacement);
        Ok(())
    }

    /// Replaces every occurrence of `url`, using the form found first.
    /// Returns the number of replaced spans.
    pub fn replace_url_everywhere(
        &mut self,
        url: &str,
        literal: &str,
        manifest_url: &str,
        position: UrlPosition,
        replacement: &str,
    ) -> Result<usize, ParseFault> {
        let located = url_codec::locate_url(&self.text, url, Some(literal), manifest_url, position)?;
        let form = located.form.to_string();

        let mut replaced = 0;
        let mut from = located.start;
        while let Some(start) = url_codec::find_delimited_from(&self.text, &form, position, from) {
            self.text
                .replace_range(start..start + form.len(), replacement);
            from = start + replacement.len();
            replaced += 1;
        }

        if replaced == 0 {
            return Err(ParseFault::url_not_found(url, manifest_url));
        }
        Ok(replaced)
    }

    pub fn render(self) -> String {
        self.text
    }
}
