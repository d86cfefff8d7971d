use super::{BuildStrategy, rest::RestRequest};
use crate::error::SocketError;
use base64::Engine;
use hmac::Mac;

/// API specific signing logic used by a [`RequestSigner`].
///
/// Implementors describe what bytes the venue wants signed, and how the
/// resulting signature is attached to the outgoing request (headers, query
/// parameters, etc).
pub trait Signer {
    /// Everything extracted from the [`RestRequest`] that is needed to sign
    /// and finalise it (eg/ api key, nonce, serialised body).
    type Config<'a>
    where
        Self: 'a;

    /// Extract the [`Self::Config`] from the provided [`RestRequest`] and
    /// in-progress [`reqwest::RequestBuilder`].
    fn config<'a, Request>(
        &'a self,
        request: Request,
        builder: &reqwest::RequestBuilder,
    ) -> Result<Self::Config<'a>, SocketError>
    where
        Request: RestRequest;

    /// Feed the venue's message-to-sign into the provided [`Mac`].
    fn add_bytes_to_sign<M>(mac: &mut M, config: &Self::Config<'_>)
    where
        M: Mac;

    /// Attach the encoded signature and any mandatory headers, producing the
    /// final [`reqwest::Request`].
    fn build_signed_request(
        config: Self::Config<'_>,
        builder: reqwest::RequestBuilder,
        signature: String,
    ) -> Result<reqwest::Request, SocketError>;
}

/// [`BuildStrategy`] that signs every [`RestRequest`] using API specific
/// [`Signer`] logic and a cloneable [`Mac`] keyed with the API secret.
///
/// Signatures are emitted base64-encoded, the convention of the Kraken-style
/// spot APIs this crate targets.
#[derive(Debug, Clone)]
pub struct RequestSigner<Sig, HmacMac> {
    signer: Sig,
    mac: HmacMac,
}

impl<Sig, HmacMac> RequestSigner<Sig, HmacMac>
where
    Sig: Signer,
    HmacMac: Mac + Clone,
{
    pub fn new(signer: Sig, mac: HmacMac) -> Self {
        Self { signer, mac }
    }
}

impl<Sig, HmacMac> BuildStrategy for RequestSigner<Sig, HmacMac>
where
    Sig: Signer,
    HmacMac: Mac + Clone,
{
    fn build<Request>(
        &self,
        request: Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, SocketError>
    where
        Request: RestRequest,
    {
        let config = self.signer.config(request, &builder)?;

        // Fresh Mac per request: the keyed state is cheap to clone
        let mut mac = self.mac.clone();
        Sig::add_bytes_to_sign(&mut mac, &config);

        let signature =
            base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        Sig::build_signed_request(config, builder, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::Hmac;
    use sha2::Sha256;
    use std::borrow::Cow;

    struct DummyRequest;

    impl RestRequest for DummyRequest {
        type Response = serde_json::Value;
        type QueryParams = ();
        type Body = ();

        fn path(&self) -> Cow<'static, str> {
            "/ping".into()
        }
    }

    struct DummySigner;

    impl Signer for DummySigner {
        type Config<'a> = &'static str;

        fn config<'a, Request>(
            &'a self,
            _: Request,
            _: &reqwest::RequestBuilder,
        ) -> Result<Self::Config<'a>, SocketError>
        where
            Request: RestRequest,
        {
            Ok("message-to-sign")
        }

        fn add_bytes_to_sign<M>(mac: &mut M, config: &Self::Config<'_>)
        where
            M: Mac,
        {
            mac.update(config.as_bytes());
        }

        fn build_signed_request(
            _: Self::Config<'_>,
            builder: reqwest::RequestBuilder,
            signature: String,
        ) -> Result<reqwest::Request, SocketError> {
            builder
                .header("X-Signature", signature)
                .build()
                .map_err(SocketError::from)
        }
    }

    #[test]
    fn test_request_signer_attaches_base64_hmac() {
        let mac = Hmac::<Sha256>::new_from_slice(b"secret").unwrap();
        let strategy = RequestSigner::new(DummySigner, mac.clone());

        let builder = reqwest::Client::new().get("https://api.example.com/ping");
        let request = strategy.build(DummyRequest, builder).unwrap();

        let mut expected_mac = mac;
        expected_mac.update(b"message-to-sign");
        let expected =
            base64::engine::general_purpose::STANDARD.encode(expected_mac.finalize().into_bytes());

        assert_eq!(
            request.headers().get("X-Signature").unwrap(),
            expected.as_str()
        );
    }
}
