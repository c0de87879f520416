//! Playlists served through the pass-through endpoint (subtitles, I-frame
//! playlists) are not tracked, but their URIs must still resolve against the
//! origin rather than the proxy root.

use crate::url_codec;

const URI_ATTRIBUTE: &str = "URI=\"";

/// Points every http(s) URI line and `URI="..."` attribute of `raw` at the
/// pass-through endpoint. Nothing is registered and unresolvable URIs are
/// left untouched.
pub fn rewrite_passthrough_playlist(raw: &str, playlist_url: &str, proxy_base: &str) -> String {
    let proxied = |uri: &str| {
        url_codec::absolute_url(playlist_url, uri)
            .ok()
            .filter(|absolute| absolute.starts_with("http://") || absolute.starts_with("https://"))
            .map(|absolute| url_codec::passthrough_proxy_url(proxy_base, &absolute))
    };

    let mut out = String::with_capacity(raw.len());
    for line in raw.split_inclusive('\n') {
        let body = line.trim_end_matches(['\r', '\n']);
        let ending = &line[body.len()..];

        if body.starts_with('#') {
            out.push_str(&rewrite_uri_attributes(body, &proxied));
        } else if body.trim().is_empty() {
            out.push_str(body);
        } else {
            match proxied(body.trim()) {
                Some(replacement) => out.push_str(&replacement),
                None => out.push_str(body),
            }
        }
        out.push_str(ending);
    }
    out
}

fn rewrite_uri_attributes(tag: &str, proxied: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(tag.len());
    let mut rest = tag;

    while let Some(pos) = rest.find(URI_ATTRIBUTE) {
        let value_start = pos + URI_ATTRIBUTE.len();
        let Some(len) = rest[value_start..].find('"') else {
            break;
        };
        out.push_str(&rest[..value_start]);

        // `URI=` must be a whole attribute name, not the tail of another one.
        let whole_name = matches!(rest[..pos].as_bytes().last(), Some(b':' | b','));
        let value = &rest[value_start..value_start + len];
        match proxied(value).filter(|_| whole_name) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(value),
        }
        rest = &rest[value_start + len..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYLIST_URL: &str = "https://cdn.example.com/vod/subs/en.m3u8";
    const PROXY: &str = "http://127.0.0.1:8080";

    fn relayed(url: &str) -> String {
        url_codec::passthrough_proxy_url(PROXY, url)
    }

    #[test]
    fn uri_lines_resolve_against_origin() {
        let raw = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6.0,\nsub0.vtt\r\n\
                   #EXTINF:6.0,\nhttps://other.example.com/sub1.vtt\n#EXT-X-ENDLIST\n";
        let out = rewrite_passthrough_playlist(raw, PLAYLIST_URL, PROXY);

        assert_eq!(
            out,
            format!(
                "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6.0,\n{}\r\n#EXTINF:6.0,\n{}\n#EXT-X-ENDLIST\n",
                relayed("https://cdn.example.com/vod/subs/sub0.vtt"),
                relayed("https://other.example.com/sub1.vtt"),
            )
        );
    }

    #[test]
    fn uri_attributes_are_rewritten() {
        let raw = "#EXTM3U\n#EXT-X-MAP:URI=\"../init.mp4\"\n\
                   #EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"skd://key\",KEYFORMAT=\"com.apple.streamingkeydelivery\"\n\
                   #EXT-X-BYTERANGE:1000@0\n#EXTINF:6.0,\nmain.ts\n";
        let out = rewrite_passthrough_playlist(raw, PLAYLIST_URL, PROXY);

        let init = relayed("https://cdn.example.com/vod/init.mp4");
        assert!(out.contains(&format!("#EXT-X-MAP:URI=\"{init}\"\n")));
        assert!(out.contains("URI=\"skd://key\""));
        assert!(out.contains("#EXT-X-BYTERANGE:1000@0\n"));
        assert!(out.ends_with(&format!("{}\n", relayed("https://cdn.example.com/vod/subs/main.ts"))));
    }

    #[test]
    fn attribute_name_suffix_is_not_a_uri() {
        let tag = "#EXT-X-SESSION-DATA:DATA-ID=\"x\",XURI=\"a.json\"";
        let out = rewrite_uri_attributes(tag, |_| Some("R".to_string()));
        assert_eq!(out, tag);
    }
}
