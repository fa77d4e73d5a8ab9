mod common;

use image::{GenericImageView, ImageFormat};
use meme_generator::client::{
    probe::{probe, ProbeOutcome},
    ApiClient, ClientError, MemeForm, SelectedImage, View, GENERATION_FAILED_MESSAGE,
};

use common::{encode, spawn_server};

#[tokio::test]
async fn form_round_trip_against_live_server() {
    let addr = spawn_server().await;
    let api = ApiClient::new(format!("http://{addr}"));

    let mut form = MemeForm::new();
    form.select_image(SelectedImage::new(
        "holiday.png",
        encode(240, 160, ImageFormat::Png),
    ));
    form.set_top_text("when the build");
    form.set_bottom_text("passes first try");

    form.submit(&api).await.unwrap();

    assert!(!form.is_loading());
    assert_eq!(form.error(), None);
    assert!(!form.can_submit());
    let View::Generated(jpeg) = form.view() else {
        panic!("expected generated view");
    };
    let decoded = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg).unwrap();
    assert_eq!(decoded.dimensions(), (240, 160));

    // Picking a new image goes back to the preview.
    form.select_image(SelectedImage::new("next.png", encode(8, 8, ImageFormat::Png)));
    assert!(matches!(form.view(), View::Preview { .. }));
}

#[tokio::test]
async fn server_rejection_becomes_generation_error() {
    let addr = spawn_server().await;
    let api = ApiClient::new(format!("http://{addr}"));

    let mut form = MemeForm::new();
    form.select_image(SelectedImage::new("clip.gif", b"GIF89a".to_vec()));
    form.set_top_text("gif");

    let err = form.submit(&api).await.unwrap_err();
    match err {
        ClientError::Generation { status, .. } => assert_eq!(status.as_u16(), 400),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(form.error(), Some(GENERATION_FAILED_MESSAGE));
    assert!(!form.is_loading());
}

#[tokio::test]
async fn probe_succeeds_against_running_server() {
    let addr = spawn_server().await;
    let outcome = probe(&ApiClient::new(format!("http://{addr}"))).await;
    assert_eq!(outcome, ProbeOutcome::Healthy);
    assert_eq!(outcome.exit_code(), 0);
}

#[tokio::test]
async fn probe_fails_on_non_2xx() {
    let addr = spawn_server().await;
    // Same server, but a base URL whose health route does not exist.
    let outcome = probe(&ApiClient::new(format!("http://{addr}/missing"))).await;
    assert!(matches!(outcome, ProbeOutcome::Unhealthy(_)));
    assert_eq!(outcome.exit_code(), 1);
}
