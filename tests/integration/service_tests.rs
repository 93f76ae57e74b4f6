//! Service core tests through the neutral request/response shapes.
//!
//! Tests verify:
//! - The request state machine and its status mapping
//! - Etag derivation and header pass-through
//! - Placeholder generation for missing media
//! - The crop/scale rules on real images

use http::{Method, StatusCode};
use image::ImageFormat;

use nuggan::{ImageHandler, ImageRequest, ImageResponse, ImageService, ProxyConfig, Referer};

use super::test_utils::{
    create_image, create_noise_png, create_service, create_transparent_png, dimensions,
    image_path, is_gif, is_jpeg, test_codec, test_config, MockFetcher, MockMedia,
    UnreachableFetcher, ICONS_CDN0, ICONS_CDN1, WIKIMEDIA,
};

fn photo_url() -> String {
    format!("{}/a/ab/Photo.jpg", WIKIMEDIA)
}

async fn get(service: &ImageService<MockFetcher>, path: &str) -> ImageResponse {
    service.handle(ImageRequest::new(Method::GET, path)).await
}

async fn head(service: &ImageService<MockFetcher>, path: &str) -> ImageResponse {
    service.handle(ImageRequest::new(Method::HEAD, path)).await
}

fn photo_service(width: u32, height: u32) -> (ImageService<MockFetcher>, MockFetcher) {
    let fetcher = MockFetcher::new().with_media(
        photo_url(),
        MockMedia::ok(create_image(width, height, ImageFormat::Jpeg))
            .with_header("etag", "\"5f3a-1\"")
            .with_header("date", "Tue, 01 Oct 2024 10:00:00 GMT")
            .with_header("last-modified", "Mon, 30 Sep 2024 08:00:00 GMT")
            .with_header("x-backend-only", "secret"),
    );
    (create_service(test_config(), fetcher.clone()), fetcher)
}

// =============================================================================
// Successful Requests
// =============================================================================

#[tokio::test]
async fn test_get_scales_by_width_ratio() {
    let (service, _) = photo_service(250, 340);
    let response = get(&service, &image_path(&photo_url(), "0/0/-/-/95/150/-")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(is_jpeg(response.body()));
    assert_eq!(dimensions(response.body()), (95, 129));
}

#[tokio::test]
async fn test_get_scales_by_height_ratio() {
    let (service, _) = photo_service(250, 340);
    let response = get(&service, &image_path(&photo_url(), "0/0/-/-/125/91/-")).await;

    assert_eq!(dimensions(response.body()), (67, 91));
}

#[tokio::test]
async fn test_get_oversized_resize_keeps_size() {
    let (service, _) = photo_service(250, 340);
    let response = get(&service, &image_path(&photo_url(), "0/0/-/-/500/-/-")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(dimensions(response.body()), (250, 340));
}

#[tokio::test]
async fn test_get_out_of_bounds_crop_defaults_to_full_image() {
    let (service, _) = photo_service(250, 340);
    let response = get(&service, &image_path(&photo_url(), "-5/0/-/-/-/-/-")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(dimensions(response.body()), (250, 340));
}

#[tokio::test]
async fn test_get_crop_and_scale() {
    let (service, _) = photo_service(250, 340);
    let response = get(&service, &image_path(&photo_url(), "50/40/100/200/50/-/-")).await;

    assert_eq!(dimensions(response.body()), (50, 100));
}

#[tokio::test]
async fn test_get_headers() {
    let (service, _) = photo_service(40, 30);
    let path = image_path(&photo_url(), "0/0/-/-/20/-/-");
    let token = path.rsplit('/').next().unwrap().to_string();

    let response = get(&service, &path).await;

    assert_eq!(response.header("content-type"), Some("image/jpeg"));
    assert_eq!(
        response.header("content-disposition"),
        Some(format!("inline; filename=\"{}.jpg\"", token).as_str())
    );
    assert_eq!(response.header("etag"), Some("optimg/0/0/-/-/20/-/-/5f3a-1"));
    assert_eq!(response.header("date"), Some("Tue, 01 Oct 2024 10:00:00 GMT"));
    assert_eq!(
        response.header("last-modified"),
        Some("Mon, 30 Sep 2024 08:00:00 GMT")
    );
    assert!(response.header("x-backend-only").is_none());
    assert!(response.header("cache-control").is_none());
}

#[tokio::test]
async fn test_cache_control_from_config() {
    let fetcher = MockFetcher::new().with_media(
        photo_url(),
        MockMedia::ok(create_image(40, 30, ImageFormat::Jpeg)),
    );
    let config = test_config().with_cache_control("public, max-age=86400");
    let service = create_service(config, fetcher);

    let response = get(&service, &image_path(&photo_url(), "0/0/-/-/-/-/-")).await;
    assert_eq!(response.header("cache-control"), Some("public, max-age=86400"));

    let response = head(&service, &image_path(&photo_url(), "0/0/-/-/-/-/-")).await;
    assert_eq!(response.header("cache-control"), Some("public, max-age=86400"));
}

#[tokio::test]
async fn test_etag_defaults_to_token() {
    let fetcher = MockFetcher::new().with_media(
        photo_url(),
        MockMedia::ok(create_image(10, 10, ImageFormat::Jpeg)),
    );
    let service = create_service(test_config(), fetcher);
    let path = image_path(&photo_url(), "1/2/3/4/-/-/-");

    let response = head(&service, &path).await;
    assert_eq!(response.header("etag"), Some(&path[1..]));
}

#[tokio::test]
async fn test_head_returns_headers_only() {
    let (service, fetcher) = photo_service(250, 340);
    let response = head(&service, &image_path(&photo_url(), "0/0/-/-/95/-/-")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.body().is_empty());
    assert_eq!(response.header("etag"), Some("optimg/0/0/-/-/95/-/-/5f3a-1"));
    assert!(response.header("content-type").is_none());
    assert_eq!(fetcher.request_count(), 1);
}

#[tokio::test]
async fn test_head_does_not_decode_invalid_media() {
    let fetcher = MockFetcher::new().with_media(photo_url(), MockMedia::ok(b"garbage".to_vec()));
    let service = create_service(test_config(), fetcher);

    let response = head(&service, &image_path(&photo_url(), "0/0/-/-/-/-/-")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_group_alias_resolves_to_first_base() {
    let icon = "/octicons/1024/mark-github-512.png";
    let fetcher = MockFetcher::new().with_media(
        format!("{}{}", ICONS_CDN0, icon),
        MockMedia::ok(create_transparent_png(64, 64)),
    );
    let service = create_service(test_config(), fetcher.clone());

    // Encoded from the second alias, fetched from the first
    let response = get(&service, &image_path(&format!("{}{}", ICONS_CDN1, icon), "0/0/-/-/-/-/-")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fetcher.requests(), vec![format!("{}{}", ICONS_CDN0, icon)]);
}

#[tokio::test]
async fn test_png_output_is_palette_encoded() {
    let url = format!("{}/logo.png", ICONS_CDN0);
    let fetcher = MockFetcher::new().with_media(&url, MockMedia::ok(create_transparent_png(80, 40)));
    let service = create_service(test_config(), fetcher);

    let response = get(&service, &image_path(&url, "0/0/-/-/40/-/9")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("image/png"));
    assert!(response.header("content-disposition").unwrap().ends_with(".png\""));

    let reader = png::Decoder::new(response.body()).read_info().unwrap();
    assert_eq!(reader.info().color_type, png::ColorType::Indexed);
    assert_eq!((reader.info().width, reader.info().height), (40, 20));
    assert!(reader.info().trns.is_some());
}

#[tokio::test]
async fn test_noisy_png_served_without_palette() {
    let url = format!("{}/photo.png", WIKIMEDIA);
    let fetcher = MockFetcher::new().with_media(&url, MockMedia::ok(create_noise_png(400, 300)));
    let service = create_service(test_config(), fetcher);

    let response = get(&service, &image_path(&url, "0/0/-/-/200/-/9")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("image/png"));
    assert_eq!(dimensions(response.body()), (200, 150));
}

// =============================================================================
// Client Errors
// =============================================================================

#[tokio::test]
async fn test_too_few_segments() {
    let (service, fetcher) = photo_service(10, 10);
    let response = get(&service, "/optimg/0/0/-/-/-/token").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.header("content-type"), Some("text/plain"));
    assert_eq!(response.body(), b"Unexpected request to '/optimg/0/0/-/-/-/token'");
    assert_eq!(fetcher.request_count(), 0);
}

#[tokio::test]
async fn test_wrong_route_prefix() {
    let (service, _) = photo_service(10, 10);
    let path = image_path(&photo_url(), "0/0/-/-/-/-/-").replacen("/optimg/", "/images/", 1);

    let response = get(&service, &path).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_custom_route_prefix() {
    let fetcher = MockFetcher::new().with_media(
        photo_url(),
        MockMedia::ok(create_image(10, 10, ImageFormat::Jpeg)),
    );
    let config = test_config().with_route_prefix("img").unwrap();
    let service = create_service(config, fetcher);

    let token = test_codec().encode(&photo_url());
    let response = get(&service, &format!("/img/0/0/-/-/-/-/-/{}", token)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_field_messages() {
    let (service, fetcher) = photo_service(10, 10);

    let cases = [
        ("x/0/-/-/-/-/-", "Invalid crop x offset: "),
        ("0/y/-/-/-/-/-", "Invalid crop y offset: "),
        ("0/0/w/-/-/-/-", "Invalid crop width: "),
        ("0/0/-/h/-/-/-", "Invalid crop height: "),
        ("0/0/-/-/rw/-/-", "Invalid resize width 'rw': "),
        ("0/0/-/-/-/rh/-", "Invalid resize height 'rh': "),
        ("0/0/-/-/-/-/c", "Invalid compression level 'c': "),
    ];

    for (geometry, prefix) in cases {
        let response = get(&service, &image_path(&photo_url(), geometry)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", geometry);

        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.starts_with(prefix), "{} -> {}", geometry, body);
    }

    assert_eq!(fetcher.request_count(), 0);
}

#[tokio::test]
async fn test_strict_mode_rejects_plain_token_without_fetch() {
    let url = "https://elsewhere.example.org/picture.jpg";
    let fetcher = MockFetcher::new().with_media(url, MockMedia::ok(create_image(10, 10, ImageFormat::Jpeg)));
    let service = create_service(test_config().with_strict(true), fetcher.clone());

    let token = test_codec().encode(url);
    assert!(!token.starts_with('_'));

    let response = get(&service, &format!("/optimg/0/0/-/-/-/-/-/{}", token)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        response.body(),
        format!("Base64url '{}' cannot be specified in strict mode", token).as_bytes()
    );
    assert_eq!(fetcher.request_count(), 0);
}

#[tokio::test]
async fn test_plain_token_allowed_without_strict() {
    let url = "https://elsewhere.example.org/picture.jpg";
    let fetcher = MockFetcher::new().with_media(url, MockMedia::ok(create_image(10, 10, ImageFormat::Jpeg)));
    let service = create_service(test_config(), fetcher);

    let token = test_codec().encode(url);
    let response = get(&service, &format!("/optimg/0/0/-/-/-/-/-/{}", token)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Internal Errors
// =============================================================================

#[tokio::test]
async fn test_decode_error_is_internal() {
    let (service, fetcher) = photo_service(10, 10);

    let response = get(&service, "/optimg/0/0/-/-/-/-/-/_9_aGVsbG8=").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body(), b"Invalid group index: 9");

    let response = get(&service, "/optimg/0/0/-/-/-/-/-/_0aGVsbG8=").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.body(),
        b"Invalid base64Ref '_0aGVsbG8=': second '_' separator expected after group index"
    );

    assert_eq!(fetcher.request_count(), 0);
}

#[tokio::test]
async fn test_unreachable_backend_is_internal() {
    let service = ImageService::new(test_config(), UnreachableFetcher, super::test_utils::shared_library());
    let request = ImageRequest::new(Method::GET, image_path(&photo_url(), "0/0/-/-/-/-/-"));

    let response = service.handle(request).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.header("content-type"), Some("text/plain"));
}

#[tokio::test]
async fn test_undecodable_media_is_internal() {
    let fetcher = MockFetcher::new().with_media(photo_url(), MockMedia::ok(b"<html>".to_vec()));
    let service = create_service(test_config(), fetcher);

    let response = get(&service, &image_path(&photo_url(), "0/0/-/-/-/-/-")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.header("content-disposition").is_none());
}

#[tokio::test]
async fn test_empty_crop_is_internal() {
    let (service, _) = photo_service(20, 20);
    let response = get(&service, &image_path(&photo_url(), "0/0/0/-/-/-/-")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// =============================================================================
// Placeholders
// =============================================================================

#[tokio::test]
async fn test_backend_404_placeholder_sized_to_resize_box() {
    let service = create_service(test_config(), MockFetcher::new());
    let response = get(&service, &image_path(&photo_url(), "0/0/-/-/95/150/-")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.header("content-type"), Some("image/gif"));
    assert_eq!(
        response.header("content-disposition"),
        Some("inline; filename=\"not-found.gif\"")
    );
    assert_eq!(
        response.header("cache-control"),
        Some("public, no-cache, no-store, must-revalidate")
    );
    assert!(is_gif(response.body()));
    assert_eq!(dimensions(response.body()), (95, 150));
}

#[tokio::test]
async fn test_placeholder_minimum_size() {
    let service = create_service(test_config(), MockFetcher::new());

    let response = get(&service, &image_path(&photo_url(), "0/0/-/-/-/-/-")).await;
    assert_eq!(dimensions(response.body()), (1, 1));

    let response = get(&service, &image_path(&photo_url(), "0/0/-/-/-3/0/-")).await;
    assert_eq!(dimensions(response.body()), (1, 1));
}

#[tokio::test]
async fn test_backend_error_status_uses_placeholder() {
    let fetcher = MockFetcher::new().with_media(
        photo_url(),
        MockMedia::status(StatusCode::SERVICE_UNAVAILABLE).with_header("etag", "\"ignored\""),
    );
    let service = create_service(test_config(), fetcher);

    let response = get(&service, &image_path(&photo_url(), "0/0/-/-/12/-/-")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.header("etag").is_none());
    assert_eq!(dimensions(response.body()), (12, 1));
}

#[tokio::test]
async fn test_head_placeholder_has_no_body() {
    let service = create_service(test_config(), MockFetcher::new());
    let response = head(&service, &image_path(&photo_url(), "0/0/-/-/95/150/-")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.header("content-type"), Some("image/gif"));
    assert!(response.body().is_empty());
}

// =============================================================================
// Miscellaneous
// =============================================================================

#[tokio::test]
async fn test_referer_does_not_affect_response() {
    let (service, _) = photo_service(20, 20);
    let path = image_path(&photo_url(), "0/0/-/-/-/-/-");

    let plain = service.handle(ImageRequest::new(Method::GET, &path)).await;
    let referred = service
        .handle(
            ImageRequest::new(Method::GET, &path)
                .with_referer(Referer::new(Some("https://blog.example".into()), Some("agent".into()))),
        )
        .await;

    assert_eq!(plain.status(), referred.status());
    assert_eq!(plain.header("etag"), referred.header("etag"));
}

#[tokio::test]
async fn test_concurrent_requests() {
    let (service, fetcher) = photo_service(120, 80);
    let service = std::sync::Arc::new(service);

    let handles: Vec<_> = (1..=8)
        .map(|i| {
            let service = std::sync::Arc::clone(&service);
            tokio::spawn(async move {
                let path = image_path(&photo_url(), &format!("0/0/-/-/{}/-/-", i * 10));
                service.handle(ImageRequest::new(Method::GET, path)).await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let response = handle.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(dimensions(response.body()).0, (i as u32 + 1) * 10);
    }

    assert_eq!(fetcher.request_count(), 8);
}

#[test]
fn test_config_rejects_slash_in_prefix() {
    let err = ProxyConfig::new(vec![vec![WIKIMEDIA.to_string()]])
        .unwrap()
        .with_route_prefix("a/b")
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid route prefix contains '/': a/b");
}
