// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::ClientBuilder;
use std::error::Error;
#[cfg(feature = "fips")]
use tracing::debug;
use tracing::warn;

/// Creates a reqwest client builder with TLS configuration.
///
/// `accept_invalid_certs` turns off certificate verification for endpoints
/// using self-signed certificates (Cloud Foundry lab environments mostly).
#[cfg(not(feature = "fips"))]
pub fn create_reqwest_client_builder(
    accept_invalid_certs: bool,
) -> Result<ClientBuilder, Box<dyn Error>> {
    if accept_invalid_certs {
        warn!("TLS certificate verification is disabled for outbound HTTPS requests");
    }
    Ok(reqwest::Client::builder()
        .use_rustls_tls()
        .danger_accept_invalid_certs(accept_invalid_certs))
}

/// Creates a reqwest client builder with FIPS-compliant TLS configuration.
/// This version loads native root certificates and verifies FIPS compliance.
/// Skipping certificate verification is refused in this mode.
#[cfg(feature = "fips")]
pub fn create_reqwest_client_builder(
    accept_invalid_certs: bool,
) -> Result<ClientBuilder, Box<dyn Error>> {
    if accept_invalid_certs {
        warn!("Refusing to disable TLS certificate verification in FIPS mode");
        return Err("Skipping TLS verification is not allowed in FIPS mode".into());
    }

    // The process must install a FIPS provider at startup,
    // e.g. rustls::crypto::default_fips_provider().install_default()
    let provider =
        rustls::crypto::CryptoProvider::get_default().ok_or("No crypto provider configured")?;

    if !provider.fips() {
        return Err("Crypto provider is not FIPS-compliant".into());
    }

    let mut root_cert_store = rustls::RootCertStore::empty();
    let native_certs = rustls_native_certs::load_native_certs();
    let mut valid_count = 0;
    for cert in native_certs.certs {
        match root_cert_store.add(cert) {
            Ok(()) => valid_count += 1,
            Err(err) => {
                debug!("Failed to parse certificate: {:?}", err);
            }
        }
    }
    if valid_count == 0 {
        return Err("No valid certificates found in native root store".into());
    }

    let versions = rustls::ALL_VERSIONS.to_vec();
    let config_builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&versions)
        .map_err(|_| "Failed to set protocol versions")?;

    let config = config_builder
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();

    if !config.fips() {
        return Err("The final TLS configuration is not FIPS-compliant".into());
    }
    debug!("Client builder is configured with FIPS.");

    Ok(reqwest::Client::builder().use_preconfigured_tls(config))
}

#[cfg(all(test, not(feature = "fips")))]
mod tests {
    use super::*;

    #[test]
    fn builds_client_with_and_without_verification() {
        for accept_invalid_certs in [false, true] {
            let builder = create_reqwest_client_builder(accept_invalid_certs)
                .expect("builder creation failed");
            assert!(builder.build().is_ok());
        }
    }
}
