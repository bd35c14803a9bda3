//! Best-effort warming of remote image URLs.

use url::Url;

use crate::background::BackgroundWriter;

/// Fetch each URL in the background and discard the body.
///
/// Only intermediaries' HTTP caches are affected; failures are logged at debug
/// level and otherwise ignored. Returns how many fetches were started.
pub fn preload_images<I, S>(http: &reqwest::Client, urls: I, writer: &BackgroundWriter) -> usize
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut started = 0;
  for raw in urls {
    let raw = raw.as_ref();
    let url = match image_url(raw) {
      Ok(url) => url,
      Err(reason) => {
        tracing::debug!(url = %raw, reason, "skipping image url");
        continue;
      }
    };

    let http = http.clone();
    writer.spawn("preload", raw, async move {
      let response = http.get(url).send().await?.error_for_status()?;
      let bytes = response.bytes().await?;
      tracing::trace!(len = bytes.len(), "image preloaded");
      Ok::<_, reqwest::Error>(())
    });
    started += 1;
  }
  started
}

/// Parse a preloadable URL, or say why it is skipped.
fn image_url(raw: &str) -> Result<Url, &'static str> {
  let url = Url::parse(raw).map_err(|_| "unparseable")?;
  match url.scheme() {
    "http" | "https" => Ok(url),
    _ => Err("unsupported scheme"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[tokio::test]
  async fn test_fetches_each_valid_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/img/hero.jpg"))
      .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/img/missing.jpg"))
      .respond_with(ResponseTemplate::new(404))
      .expect(1)
      .mount(&server)
      .await;

    let writer = BackgroundWriter::new();
    let urls = vec![
      format!("{}/img/hero.jpg", server.uri()),
      format!("{}/img/missing.jpg", server.uri()),
      "not a url".to_string(),
      "ftp://example.com/x.jpg".to_string(),
    ];

    let started = preload_images(&reqwest::Client::new(), &urls, &writer);
    writer.drain().await;

    assert_eq!(started, 2);
  }

  #[test]
  fn test_skip_reasons() {
    assert!(image_url("https://cdn.example.com/a.jpg").is_ok());
    assert_eq!(image_url("not a url").unwrap_err(), "unparseable");
    assert_eq!(image_url("ftp://cdn.example.com/a.jpg").unwrap_err(), "unsupported scheme");
  }
}
