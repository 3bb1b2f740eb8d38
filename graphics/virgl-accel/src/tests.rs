//! Cross-module scenarios against a recording transport

use std::sync::Arc;

use virgl_protocol::drm::ClipRect;
use virgl_protocol::{CommandHeader, Opcode, TransferBox, BLIT_LENGTH};

use crate::backend::{HostBackend, SoftwareBackend, UsageHint};
use crate::config::AccelConfig;
use crate::context::{DeviceContext, PixmapId};
use crate::error::Verb;
use crate::region::{Rect, Region};
use crate::surface::AccessMode;
use crate::transport::mock::RecordingTransport;

fn context(config: AccelConfig) -> (Arc<RecordingTransport>, DeviceContext) {
    let transport = Arc::new(RecordingTransport::new());
    let backend = Box::new(HostBackend::new(transport.clone()));
    let ctx = DeviceContext::new(config, transport.clone(), backend).unwrap();
    (transport, ctx)
}

fn host_pixmap(ctx: &mut DeviceContext, width: u32, height: u32) -> PixmapId {
    ctx.create_pixmap(width, height, 32, UsageHint::HOST_ACCELERATED)
        .unwrap()
        .unwrap()
}

fn res(ctx: &DeviceContext, id: PixmapId) -> u32 {
    ctx.surface(id).and_then(|s| s.res_handle()).unwrap()
}

#[test]
fn test_blit_between_pixmaps() {
    let (transport, mut ctx) = context(AccelConfig::default());
    let a = host_pixmap(&mut ctx, 256, 256);
    let b = host_pixmap(&mut ctx, 256, 256);

    assert!(ctx.check_copy(b, a));
    assert!(ctx.prepare_copy(a, b));
    ctx.copy(a, 0, 0, 10, 10, 64, 64).unwrap();
    transport.with(|r| assert!(r.submissions.is_empty()));

    ctx.done_copy(a).unwrap();

    let (res_a, res_b) = (res(&ctx, a), res(&ctx, b));
    transport.with(|r| {
        assert_eq!(r.submissions.len(), 1);
        let words = &r.submissions[0];
        assert_eq!(words.len(), 24);

        let header = CommandHeader::decode(words[0]).unwrap();
        assert_eq!(header.opcode, Opcode::Blit);
        assert_eq!(header.length, BLIT_LENGTH);

        assert_eq!(words[6], res_a);
        assert_eq!(&words[9..15], &TransferBox::new_2d(10, 10, 64, 64).to_words());
        assert_eq!(words[15], res_b);
        assert_eq!(&words[18..24], &TransferBox::new_2d(0, 0, 64, 64).to_words());
    });
    assert!(ctx.surface(a).unwrap().copy_source().is_none());
}

#[test]
fn test_copies_batch_until_done() {
    let (transport, mut ctx) = context(AccelConfig::default());
    let a = host_pixmap(&mut ctx, 64, 64);
    let b = host_pixmap(&mut ctx, 64, 64);

    assert!(ctx.prepare_copy(a, b));
    for i in 0..4 {
        ctx.copy(a, i, i, i * 8, 0, 8, 8).unwrap();
    }
    ctx.done_copy(a).unwrap();

    transport.with(|r| {
        assert_eq!(r.submissions.len(), 1);
        assert_eq!(r.submissions[0].len(), 4 * 24);
    });
}

#[test]
fn test_small_encoder_flushes_mid_batch() {
    let config = AccelConfig {
        encoder_capacity: 2 * 24 * 4,
        ..AccelConfig::default()
    };
    let (transport, mut ctx) = context(config);
    let a = host_pixmap(&mut ctx, 64, 64);
    let b = host_pixmap(&mut ctx, 64, 64);

    assert!(ctx.prepare_copy(a, b));
    for _ in 0..3 {
        ctx.copy(a, 0, 0, 0, 0, 8, 8).unwrap();
    }
    transport.with(|r| {
        assert_eq!(r.submissions.len(), 1);
        assert_eq!(r.submissions[0].len(), 48);
    });
    assert_eq!(ctx.encoder().offset(), 24);
}

#[test]
fn test_access_cycle_through_context() {
    let (transport, mut ctx) = context(AccelConfig::default());
    let a = host_pixmap(&mut ctx, 128, 128);
    let region = Region::from_rect(Rect::from_size(16, 16, 32, 32));

    ctx.prepare_access(a, &region, AccessMode::ReadWrite).unwrap();
    ctx.prepare_access(a, &region, AccessMode::ReadWrite).unwrap();
    if let Some(pixels) = ctx.surface_mut(a).and_then(|s| s.pixels_mut()) {
        pixels[16 * 512 + 16 * 4] = 0xff;
    }
    ctx.finish_access(a).unwrap();

    transport.with(|r| {
        assert_eq!(r.gets.len(), 1);
        assert_eq!(r.puts.len(), 1);
        assert_eq!(r.puts[0].1.offset, 16 * 512 + 16 * 4);
        assert_eq!(r.puts[0].1.stride, 512);
    });

    // Not a screen pixmap, so nothing to report
    assert!(ctx.damage().is_empty());
}

#[test]
fn test_scattered_writes_use_bounding_box() {
    let (transport, mut ctx) = context(AccelConfig::default());
    let a = host_pixmap(&mut ctx, 256, 256);

    let dots = Region::from_rects((0..30).map(|i| Rect::from_size(i * 4, i * 4, 1, 1)));
    ctx.prepare_access(a, &dots, AccessMode::ReadWrite).unwrap();
    ctx.finish_access(a).unwrap();

    transport.with(|r| {
        assert_eq!(r.gets.len(), 1);
        assert_eq!(r.puts.len(), 1);
        assert_eq!(r.puts[0].1.box_, TransferBox::new_2d(0, 0, 117, 117));
    });
}

#[test]
fn test_screen_writes_reach_dirty_fb() {
    let config = AccelConfig {
        framebuffer_id: 7,
        ..AccelConfig::default()
    };
    let (transport, mut ctx) = context(config);
    let a = host_pixmap(&mut ctx, 64, 64);

    let region = Region::from_rect(Rect::from_size(0, 0, 10, 10));
    ctx.prepare_access(PixmapId::SCREEN, &region, AccessMode::ReadWrite)
        .unwrap();
    ctx.finish_access(PixmapId::SCREEN).unwrap();

    assert!(ctx.prepare_copy(PixmapId::SCREEN, a));
    ctx.copy(PixmapId::SCREEN, 0, 0, 100, 100, 20, 20).unwrap();

    ctx.block_handler().unwrap();
    transport.with(|r| {
        assert_eq!(r.submissions.len(), 1);
        assert_eq!(r.dirty.len(), 1);
        let (fb, clips) = &r.dirty[0];
        assert_eq!(*fb, 7);
        assert_eq!(
            clips,
            &vec![
                ClipRect { x1: 0, y1: 0, x2: 10, y2: 10 },
                ClipRect { x1: 100, y1: 100, x2: 120, y2: 120 },
            ]
        );
    });
    assert!(ctx.damage().is_empty());

    ctx.block_handler().unwrap();
    transport.with(|r| assert_eq!(r.dirty.len(), 1));
}

#[test]
fn test_dirty_fb_failure_drops_damage() {
    let config = AccelConfig {
        framebuffer_id: 3,
        ..AccelConfig::default()
    };
    let (transport, mut ctx) = context(config);
    transport.fail(Verb::DirtyFb, nix::Error::EINVAL);

    ctx.damage_primary(Rect::from_size(0, 0, 5, 5));
    ctx.block_handler().unwrap();
    assert!(ctx.damage().is_empty());
}

#[test]
fn test_no_framebuffer_no_dirty() {
    let (transport, mut ctx) = context(AccelConfig::default());
    ctx.damage_primary(Rect::from_size(0, 0, 5, 5));
    ctx.block_handler().unwrap();

    transport.with(|r| {
        assert!(r.dirty.is_empty());
        assert!(r.submissions.is_empty());
    });
}

#[test]
fn test_migrate_then_share() {
    let (transport, mut ctx) = context(AccelConfig::default());
    let cpu = ctx
        .create_pixmap(32, 32, 32, UsageHint::empty())
        .unwrap()
        .unwrap();
    if let Some(pixels) = ctx.surface_mut(cpu).and_then(|s| s.pixels_mut()) {
        pixels.fill(0x5a);
    }

    let before = transport.with(|r| r.created.len());
    ctx.migrate_to_host(cpu).unwrap();
    ctx.migrate_to_host(cpu).unwrap();

    assert!(ctx.surface(cpu).unwrap().is_host_backed());
    transport.with(|r| {
        assert_eq!(r.created.len(), before + 1);
        assert_eq!(r.puts.len(), 1);
        assert_eq!(r.puts[0].1.box_, TransferBox::new_2d(0, 0, 32, 32));
    });

    let region = Region::from_rect(Rect::from_size(0, 0, 1, 1));
    ctx.prepare_access(cpu, &region, AccessMode::ReadOnly).unwrap();
    let first = ctx.surface(cpu).and_then(|s| s.pixels()).map(|p| p[0]);
    assert_eq!(first, Some(0x5a));
    ctx.finish_access(cpu).unwrap();

    assert!(ctx.export_name(cpu).is_ok());
}

#[test]
fn test_software_backend_context() {
    let transport = Arc::new(RecordingTransport::new());
    let mut ctx =
        DeviceContext::new(AccelConfig::default(), transport.clone(), Box::new(SoftwareBackend))
            .unwrap();

    let a = ctx
        .create_pixmap(16, 16, 32, UsageHint::HOST_ACCELERATED)
        .unwrap()
        .unwrap();
    let b = ctx
        .create_pixmap(16, 16, 32, UsageHint::HOST_ACCELERATED)
        .unwrap()
        .unwrap();
    assert!(!ctx.prepare_copy(a, b));

    ctx.prepare_access(a, &Region::from_rect(Rect::from_size(0, 0, 16, 16)), AccessMode::ReadWrite)
        .unwrap();
    ctx.finish_access(a).unwrap();

    transport.with(|r| {
        assert!(r.created.is_empty());
        assert!(r.gets.is_empty());
        assert!(r.puts.is_empty());
    });
}

#[test]
fn test_context_drop_releases_everything() {
    let (transport, mut ctx) = context(AccelConfig::default());
    host_pixmap(&mut ctx, 16, 16);
    host_pixmap(&mut ctx, 16, 16);
    drop(ctx);

    transport.with(|r| {
        // two pixmaps plus the primary
        assert_eq!(r.closed.len(), 3);
        assert_eq!(r.munmaps, 1);
    });
}
