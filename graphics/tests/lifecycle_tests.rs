//! Texture lifecycle integration tests.
//!
//! Tests that only observe behavior through the public API are parameterized
//! over backends with `rstest` and skip backends that are unavailable. Tests
//! that count hardware objects run on the dummy backend, whose ledger records
//! every creation and destruction.
//!
//! # Test Categories
//!
//! - **Upload Tests**: staged and linear uploads, mip generation
//! - **Deferred Destruction Tests**: frame bins and in-flight tracking
//! - **Sampler Tests**: sampler identity per masked key
//! - **Attachment Tests**: render-target re-initialization
//! - **Cache Tests**: eviction and format widening through the facade

mod common;

use rstest::rstest;

use common::{Backend, TestContext, gradient_rgba, solid_16bit};
use texvault_core::sampler::SamplerParams;
use texvault_core::texture::{TextureFormat, TextureType, mip_chain_size};
use texvault_graphics::backend::{
    DummyOptions, ImageLayout, ImageUsage, RawImageView, RecordedCommand, ResourceKind,
};
use texvault_graphics::{
    FrameTrash, FramebufferAttachment, GraphicsError, RendererConfig, SamplerCache, Texture,
    TextureCache,
};

// ============================================================================
// Upload Tests
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_upload_creates_sampleable_texture(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };
    let mut texture = Texture::new(ctx.gpu(), TextureType::Rgba8888, SamplerParams::default());

    ctx.record(|cmd| texture.upload(cmd, 16, 8, &gradient_rgba(16, 8), false, false))
        .unwrap();

    assert_eq!(texture.format(), TextureFormat::Rgba8Unorm);
    assert_eq!((texture.width(), texture.height()), (16, 8));
    assert!(texture.image_view().is_some());
    if texture.needs_staging() {
        assert_eq!(texture.layout(), ImageLayout::ShaderReadOnly);
    } else {
        assert_eq!(texture.layout(), ImageLayout::General);
    }
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_mipmapped_upload_full_chain(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };
    let mut texture = Texture::new(ctx.gpu(), TextureType::Rgba8888, SamplerParams::default());

    ctx.record(|cmd| texture.upload(cmd, 64, 32, &gradient_rgba(64, 32), true, false))
        .unwrap();

    if texture.needs_staging() {
        assert_eq!(texture.mip_levels(), 7);
    } else {
        assert_eq!(texture.mip_levels(), 1);
    }
}

#[test]
fn test_generated_mips_record_one_blit_per_level() {
    let ctx = TestContext::dummy_with(DummyOptions::default());
    let ledger = ctx.ledger().unwrap();
    let mut texture = Texture::new(ctx.gpu(), TextureType::Rgba8888, SamplerParams::default());

    ctx.record(|cmd| texture.upload(cmd, 32, 32, &gradient_rgba(32, 32), true, false))
        .unwrap();

    let commands = ledger.take_commands();
    let blits = commands
        .iter()
        .filter(|c| matches!(c, RecordedCommand::Blit { .. }))
        .count();
    assert_eq!(texture.mip_levels(), 6);
    assert_eq!(blits, 5);
    assert_eq!(texture.layout(), ImageLayout::ShaderReadOnly);
}

#[test]
fn test_software_mips_without_blit_support() {
    let ctx = TestContext::dummy_with(DummyOptions {
        blit_supported: false,
        ..Default::default()
    });
    let ledger = ctx.ledger().unwrap();
    let mut texture = Texture::new(ctx.gpu(), TextureType::Rgba8888, SamplerParams::default());

    ctx.record(|cmd| texture.upload(cmd, 16, 16, &gradient_rgba(16, 16), true, false))
        .unwrap();

    let commands = ledger.take_commands();
    assert!(
        !commands
            .iter()
            .any(|c| matches!(c, RecordedCommand::Blit { .. }))
    );
    let regions = commands
        .iter()
        .find_map(|c| match c {
            RecordedCommand::CopyBufferToImage { regions, .. } => Some(regions.len()),
            _ => None,
        })
        .unwrap();
    assert_eq!(regions, 5);
    assert_eq!(
        texture.staging_buffer().unwrap().size() as usize,
        mip_chain_size(texture.extent(), 5, 4)
    );
}

#[test]
fn test_linear_only_format_writes_through_host() {
    let ctx = TestContext::dummy_with(DummyOptions {
        linear_only_formats: vec![TextureFormat::Rgba4444Unorm],
        ..Default::default()
    });
    let ledger = ctx.ledger().unwrap();
    let mut texture = Texture::new(ctx.gpu(), TextureType::Rgba4444, SamplerParams::default());

    ctx.record(|cmd| texture.upload(cmd, 8, 8, &solid_16bit(8, 8, 0xf00f), true, false))
        .unwrap();

    assert!(!texture.needs_staging());
    assert!(texture.staging_buffer().is_none());
    assert_eq!(texture.mip_levels(), 1);
    assert_eq!(ledger.host_bytes_written(), 128);
    assert_eq!(texture.layout(), ImageLayout::General);
}

#[test]
fn test_short_payload_is_rejected() {
    let ctx = TestContext::dummy_with(DummyOptions::default());
    let mut texture = Texture::new(ctx.gpu(), TextureType::Rgb565, SamplerParams::default());

    let err = ctx
        .record(|cmd| texture.upload(cmd, 8, 8, &[0; 10], false, false))
        .unwrap_err();
    assert!(matches!(err, GraphicsError::InvalidParameter(_)));
}

#[test]
fn test_out_of_memory_leaves_texture_empty() {
    let ctx = TestContext::dummy_with(DummyOptions {
        memory_limit: Some(1024),
        ..Default::default()
    });
    let ledger = ctx.ledger().unwrap();
    let mut texture = Texture::new(ctx.gpu(), TextureType::Rgba8888, SamplerParams::default());

    let err = ctx
        .record(|cmd| texture.upload(cmd, 64, 64, &gradient_rgba(64, 64), false, false))
        .unwrap_err();

    assert_eq!(err, GraphicsError::OutOfMemory);
    assert!(texture.is_empty());
    assert_eq!(ledger.live_total(), 0);
}

// ============================================================================
// Deferred Destruction Tests
// ============================================================================

#[test]
fn test_destroyed_on_third_advance_with_three_frames() {
    let ctx = TestContext::dummy_with(DummyOptions::default());
    let ledger = ctx.ledger().unwrap();
    let mut texture = Texture::new(ctx.gpu(), TextureType::Rgba8888, SamplerParams::default());
    ctx.record(|cmd| texture.upload(cmd, 4, 4, &gradient_rgba(4, 4), false, false))
        .unwrap();
    let mut trash = FrameTrash::new(3);
    trash.advance_frame(0, |_| {});
    assert!(trash.destroy_later(&mut texture));
    assert!(texture.is_empty());
    assert!(texture.image_view().is_none());

    trash.advance_frame(1, |_| {});
    trash.advance_frame(2, |_| {});
    assert_eq!(ledger.live(ResourceKind::Image), 1);

    trash.advance_frame(3, |_| {});
    assert_eq!(ledger.live_total(), 0);
    assert_eq!(ledger.destroyed(ResourceKind::Image), 1);
    assert_eq!(ledger.double_frees(), 0);
}

#[test]
fn test_staging_buffer_lives_until_bin_drained() {
    let ctx = TestContext::dummy_with(DummyOptions::default());
    let ledger = ctx.ledger().unwrap();
    let mut texture = Texture::new(ctx.gpu(), TextureType::Rgba8888, SamplerParams::default());
    ctx.record(|cmd| texture.upload(cmd, 4, 4, &gradient_rgba(4, 4), false, false))
        .unwrap();

    let mut trash = FrameTrash::new(2);
    trash.destroy_later(&mut texture);
    assert_eq!(ledger.live(ResourceKind::Buffer), 1);
    trash.advance_frame(1, |_| {});
    assert_eq!(ledger.live(ResourceKind::Buffer), 1);
    trash.advance_frame(2, |_| {});
    assert_eq!(ledger.live(ResourceKind::Buffer), 0);
}

#[test]
fn test_reupload_after_retire_creates_new_image() {
    let ctx = TestContext::dummy_with(DummyOptions::default());
    let ledger = ctx.ledger().unwrap();
    let mut texture = Texture::new(ctx.gpu(), TextureType::Rgba8888, SamplerParams::default());
    let mut trash = FrameTrash::new(2);

    ctx.record(|cmd| texture.upload(cmd, 4, 4, &gradient_rgba(4, 4), false, false))
        .unwrap();
    let first = texture.image();
    trash.destroy_later(&mut texture);
    ctx.record(|cmd| texture.upload(cmd, 4, 4, &gradient_rgba(4, 4), false, false))
        .unwrap();

    assert_ne!(texture.image(), first);
    assert_eq!(ledger.live(ResourceKind::Image), 2);
    trash.clear();
    assert_eq!(ledger.live(ResourceKind::Image), 1);
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
fn test_in_flight_visible_from_other_slots(#[case] depth: usize) {
    let ctx = TestContext::dummy_with(DummyOptions::default());
    let texture = Texture::new(ctx.gpu(), TextureType::Rgba8888, SamplerParams::default());
    let mut trash = FrameTrash::new(depth);

    trash.mark_in_flight(texture.id());
    assert!(!trash.is_in_flight(texture.id()));

    trash.advance_frame(1, |_| {});
    assert_eq!(trash.is_in_flight(texture.id()), depth > 1);

    for index in 2..=depth {
        trash.advance_frame(index, |_| {});
    }
    assert!(!trash.is_in_flight(texture.id()));
}

#[test]
fn test_read_only_alias_released_after_frame() {
    let backend = std::sync::Arc::new(texvault_graphics::DummyBackend::new());
    let mut cache: TextureCache<u32> = TextureCache::new(backend.clone(), RendererConfig::default());
    let mut cmd = backend.command_stream();

    cache.get_texture(1, TextureType::Rgba8888, SamplerParams::default());
    cache
        .update_texture(&1, &mut cmd, 4, 4, &gradient_rgba(4, 4), false, false)
        .unwrap();
    let primary = cache.find(&1).unwrap().image_view();
    let alias = RawImageView::Dummy(u64::MAX);
    cache
        .get_texture(1, TextureType::Rgba8888, SamplerParams::default())
        .set_read_only_image_view(alias);
    cache.set_in_flight(&1);
    assert_eq!(cache.find(&1).unwrap().read_only_image_view(), Some(alias));

    cache.set_current_index(1);
    assert_eq!(cache.find(&1).unwrap().read_only_image_view(), primary);
    assert_eq!(cache.find(&1).unwrap().image_view(), primary);
}

// ============================================================================
// Sampler Tests
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_sampler_identity_per_masked_key(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        return;
    };
    let mut samplers = SamplerCache::new(ctx.gpu(), Default::default());

    let bilinear = SamplerParams::default().with_filter_mode(1);
    let a = samplers.get_sampler(bilinear).unwrap();
    let b = samplers
        .get_sampler(SamplerParams::from_bits(bilinear.full | 0xff))
        .unwrap();
    let c = samplers.get_sampler(bilinear.with_clamp(true, true)).unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(samplers.len(), 2);

    samplers.term();
    assert!(samplers.is_empty());
}

// ============================================================================
// Attachment Tests
// ============================================================================

#[rstest]
#[case::color(TextureFormat::Rgba8Unorm, ImageUsage::COLOR_ATTACHMENT | ImageUsage::COPY_SRC)]
#[case::depth(TextureFormat::Depth32Float, ImageUsage::DEPTH_STENCIL_ATTACHMENT)]
#[case::depth_stencil(
    TextureFormat::Depth24PlusStencil8,
    ImageUsage::DEPTH_STENCIL_ATTACHMENT
)]
fn test_attachment_reinitialize_without_leaks(
    #[case] format: TextureFormat,
    #[case] usage: ImageUsage,
) {
    let ctx = TestContext::dummy_with(DummyOptions::default());
    let ledger = ctx.ledger().unwrap();
    let mut attachment = FramebufferAttachment::new(ctx.gpu());

    attachment.initialize(640, 480, format, usage).unwrap();
    let live = ledger.live_total();
    attachment.initialize(1280, 960, format, usage).unwrap();

    assert_eq!(ledger.live_total(), live);
    assert_eq!(attachment.extent().width, 1280);
    assert_eq!(attachment.stencil_view().is_some(), format.has_stencil());
    if let Some(readback) = attachment.readback_buffer() {
        assert_eq!(readback.size(), 1280 * 960 * 4);
    }

    drop(attachment);
    assert_eq!(ledger.live_total(), 0);
    assert_eq!(ledger.double_frees(), 0);
}

#[test]
fn test_attachment_unsupported_format() {
    let ctx = TestContext::dummy_with(DummyOptions {
        unsupported_formats: vec![TextureFormat::Depth32FloatStencil8],
        ..Default::default()
    });
    let mut attachment = FramebufferAttachment::new(ctx.gpu());
    let err = attachment
        .initialize(
            16,
            16,
            TextureFormat::Depth32FloatStencil8,
            ImageUsage::DEPTH_STENCIL_ATTACHMENT,
        )
        .unwrap_err();
    assert!(matches!(err, GraphicsError::FeatureNotSupported(_)));
    assert!(attachment.image().is_none());
}

// ============================================================================
// Cache Tests
// ============================================================================

#[test]
fn test_cleanup_evicts_idle_textures_in_batches() {
    let config = RendererConfig::from_toml(
        r#"
        [cache]
        max_idle_frames = 4
        max_evictions_per_cleanup = 2
        "#,
    )
    .unwrap();
    let ctx = TestContext::dummy_with(DummyOptions::default());
    let ledger = ctx.ledger().unwrap();
    let mut cache: TextureCache<u64> = TextureCache::new(ctx.gpu(), config);

    for key in 0..3 {
        cache.get_texture(key, TextureType::Rgba8888, SamplerParams::default());
        ctx.record(|cmd| cache.update_texture(&key, cmd, 2, 2, &gradient_rgba(2, 2), false, false))
            .unwrap();
    }

    for slot in 0..4 {
        cache.set_current_index(slot);
        assert_eq!(cache.cleanup(), 0);
    }
    cache.set_current_index(4);
    assert_eq!(cache.cleanup(), 2);
    assert_eq!(cache.cleanup(), 1);
    assert!(cache.is_empty());
    assert_eq!(ledger.live(ResourceKind::Image), 0);
}

#[test]
fn test_cleanup_defers_in_flight_texture() {
    let config = RendererConfig::from_toml("[cache]\nmax_idle_frames = 0\n").unwrap();
    let ctx = TestContext::dummy_with(DummyOptions::default());
    let ledger = ctx.ledger().unwrap();
    let mut cache: TextureCache<u64> = TextureCache::new(ctx.gpu(), config);

    cache.get_texture(9, TextureType::Rgba8888, SamplerParams::default());
    ctx.record(|cmd| cache.update_texture(&9, cmd, 2, 2, &gradient_rgba(2, 2), false, false))
        .unwrap();
    cache.set_in_flight(&9);
    cache.set_current_index(1);
    assert!(cache.is_in_flight(&9));

    assert_eq!(cache.cleanup(), 1);
    assert_eq!(ledger.live(ResourceKind::Image), 1);
    cache.set_current_index(0);
    cache.set_current_index(1);
    assert_eq!(ledger.live(ResourceKind::Image), 0);
}

#[test]
fn test_reupload_at_new_extent_keeps_previous_frame_objects() {
    let ctx = TestContext::dummy_with(DummyOptions::default());
    let ledger = ctx.ledger().unwrap();
    let mut cache: TextureCache<u64> = TextureCache::new(ctx.gpu(), RendererConfig::default());

    cache.get_texture(5, TextureType::Rgba8888, SamplerParams::default());
    ctx.record(|cmd| cache.update_texture(&5, cmd, 4, 4, &gradient_rgba(4, 4), false, false))
        .unwrap();
    let first_image = cache.find(&5).unwrap().image();

    cache.set_current_index(1);
    assert!(cache.is_in_flight(&5));
    ctx.record(|cmd| cache.update_texture(&5, cmd, 8, 8, &gradient_rgba(8, 8), false, false))
        .unwrap();
    assert_ne!(cache.find(&5).unwrap().image(), first_image);
    assert_eq!(ledger.live(ResourceKind::Image), 2);
    assert_eq!(ledger.live(ResourceKind::Buffer), 2);
    assert_eq!(ledger.destroyed(ResourceKind::Image), 0);

    // The 4x4 objects sit in slot 1's bin.
    cache.set_current_index(0);
    assert_eq!(ledger.live(ResourceKind::Image), 2);
    assert_eq!(ledger.live(ResourceKind::Buffer), 2);

    cache.set_current_index(1);
    assert_eq!(ledger.live(ResourceKind::Image), 1);
    assert_eq!(ledger.live(ResourceKind::Buffer), 1);
    assert_eq!(ledger.double_frees(), 0);
}

#[test]
fn test_unsampleable_16bit_widened_through_cache() {
    let ctx = TestContext::dummy_with(DummyOptions {
        unsupported_formats: vec![TextureFormat::Rgba5551Unorm],
        ..Default::default()
    });
    let mut cache: TextureCache<u64> = TextureCache::new(ctx.gpu(), RendererConfig::default());

    cache.get_texture(1, TextureType::Rgba5551, SamplerParams::default());
    ctx.record(|cmd| {
        cache.update_texture(&1, cmd, 4, 4, &solid_16bit(4, 4, 0xffff), true, false)
    })
    .unwrap();

    let texture = cache.find(&1).unwrap();
    assert_eq!(texture.format(), TextureFormat::Rgba8Unorm);
    assert_eq!(texture.tex_type(), TextureType::Rgba8888);
    assert_eq!(texture.mip_levels(), 3);
}
