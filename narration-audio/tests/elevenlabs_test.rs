use mockito::{Matcher, Server};
use narration_audio::{ElevenLabsClient, ElevenLabsConfig};
use narration_core::{NarrationError, RemoteSynthesizer};

fn client_for(server: &Server, key: Option<&str>) -> ElevenLabsClient {
    ElevenLabsClient::with_config(ElevenLabsConfig {
        api_key: key.map(str::to_string),
        base_url: server.url(),
        voice_id: "voz-kiosk".into(),
        timeout_ms: Some(2_000),
        ..ElevenLabsConfig::default()
    })
}

#[tokio::test]
async fn synthesizes_audio_from_provider() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/text-to-speech/voz-kiosk")
        .match_header("xi-api-key", "sk_test")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "text": "Nota 5 selecionada.",
            "model_id": "eleven_multilingual_v2"
        })))
        .with_status(200)
        .with_header("content-type", "audio/mpeg")
        .with_body(b"ID3\x04\x00audio")
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server, Some("sk_test"));
    let audio = client.synthesize("Nota 5 selecionada.").await.unwrap();

    assert_eq!(audio.content_type(), "audio/mpeg");
    assert_eq!(audio.data(), b"ID3\x04\x00audio");
    mock.assert_async().await;
}

#[tokio::test]
async fn provider_error_carries_detail() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/text-to-speech/voz-kiosk")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"detail":{"status":"invalid_api_key","message":"Invalid API key"}}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server, Some("sk_revoked"));
    let err = client.synthesize("Obrigado!").await.unwrap_err();

    match err {
        NarrationError::HttpError { status, detail } => {
            assert_eq!(status, 401);
            assert_eq!(detail, "Invalid API key");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn empty_body_is_a_transport_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/text-to-speech/voz-kiosk")
        .with_status(200)
        .with_header("content-type", "audio/mpeg")
        .create_async()
        .await;

    let client = client_for(&server, Some("sk_test"));
    let err = client.synthesize("Obrigado!").await.unwrap_err();
    assert!(matches!(err, NarrationError::TransportError(_)));
}

#[tokio::test]
async fn unconfigured_client_never_calls_provider() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let client = client_for(&server, Some("YOUR_API_KEY"));
    assert!(!client.is_configured());
    let err = client.synthesize("Obrigado!").await.unwrap_err();

    assert!(matches!(err, NarrationError::NotConfigured));
    mock.assert_async().await;
}
