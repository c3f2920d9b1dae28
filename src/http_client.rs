use anyhow::{bail, Result};
use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
use log::info;

const TIMEOUT_MS: u64 = 15_000;

/// Largest response body accepted. A single-station dataserver reply is a
/// few KB; anything bigger means the request went wrong.
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Perform an HTTPS GET with custom headers and return the body as a String.
///
/// Fails on any non-200 status and on bodies that are oversized or not XML.
pub fn https_get_with_headers(url: &str, headers: &[(&str, &str)]) -> Result<String> {
    let config = Configuration {
        timeout: Some(std::time::Duration::from_millis(TIMEOUT_MS)),
        use_global_ca_store: true,
        crt_bundle_attach: Some(esp_idf_sys::esp_crt_bundle_attach),
        ..Default::default()
    };

    let connection = EspHttpConnection::new(&config)?;

    use embedded_svc::http::client::Client;
    use embedded_svc::http::Method;
    let mut client = Client::wrap(connection);

    let request = client.request(Method::Get, url, headers)?.submit()?;

    let status = request.status();
    info!(
        "HTTP GET {} -> status {}",
        url.chars().take(80).collect::<String>(),
        status
    );

    if status == 429 {
        bail!("dataserver rate limited (HTTP 429)");
    }
    if status != 200 {
        bail!("HTTP error: status {}", status);
    }

    let mut body: Vec<u8> = Vec::new();
    let mut buf = [0u8; 1024];
    let mut reader = request;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
        if body.len() > MAX_BODY_BYTES {
            bail!("Response too large (>{}KB)", MAX_BODY_BYTES / 1024);
        }
    }

    let text = String::from_utf8(body)?;
    if !text.trim_start().starts_with('<') {
        bail!("Response is not XML");
    }

    Ok(text)
}
