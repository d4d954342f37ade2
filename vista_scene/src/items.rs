use std::sync::Arc;

use enum_dispatch::enum_dispatch;
use glam::Vec2;

use crate::node::{Material, Rect};

/// One drawable primitive, recorded during sync and consumed by the
/// renderer. Coordinates are node-local; the renderer applies the node's
/// world transform.
#[derive(Debug, Clone, PartialEq)]
pub enum PaintOp {
    FillRect {
        rect: Rect,
        color: [f32; 4],
    },
    Glyphs {
        origin: Vec2,
        text: Arc<str>,
        size: f32,
        color: [f32; 4],
    },
    Blit {
        rect: Rect,
        source: Arc<str>,
        opacity: f32,
    },
}

/// Recording surface handed to [`Paintable::paint`].
#[derive(Default)]
pub struct PaintSurface {
    ops: Vec<PaintOp>,
}

impl PaintSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill_rect(&mut self, rect: Rect, color: [f32; 4]) {
        self.ops.push(PaintOp::FillRect { rect, color });
    }

    pub fn glyphs(&mut self, origin: Vec2, text: Arc<str>, size: f32, color: [f32; 4]) {
        self.ops.push(PaintOp::Glyphs {
            origin,
            text,
            size,
            color,
        });
    }

    pub fn blit(&mut self, rect: Rect, source: Arc<str>, opacity: f32) {
        self.ops.push(PaintOp::Blit {
            rect,
            source,
            opacity,
        });
    }

    pub fn finish(self) -> Vec<PaintOp> {
        self.ops
    }
}

/// Items that can size themselves: given the geometry the object declares,
/// produce the rect that will actually be drawn (implicit sizes included).
#[enum_dispatch]
pub trait Geometrical {
    fn calculate_geometry(&self, declared: Rect) -> Rect;
}

/// Items that can produce drawable content for their node.
#[enum_dispatch]
pub trait Paintable {
    fn paint(&self, geometry: Rect, material: &Material, surface: &mut PaintSurface);
}

/// A solid rectangle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RectItem;

impl Geometrical for RectItem {
    fn calculate_geometry(&self, declared: Rect) -> Rect {
        declared
    }
}

impl Paintable for RectItem {
    fn paint(&self, geometry: Rect, material: &Material, surface: &mut PaintSurface) {
        if geometry.is_empty() {
            return;
        }
        let mut color = material.color;
        color[3] *= material.opacity;
        surface.fill_rect(Rect::new(0.0, 0.0, geometry.width, geometry.height), color);
    }
}

/// A text run. Implicit size comes from a flat per-glyph advance, which is
/// enough for layout expressions without pulling in a shaping stack.
#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub text: Arc<str>,
    pub font_size: f32,
}

impl Default for TextItem {
    fn default() -> Self {
        Self {
            text: Arc::<str>::from(""),
            font_size: 14.0,
        }
    }
}

const GLYPH_ADVANCE: f32 = 0.6;

impl Geometrical for TextItem {
    fn calculate_geometry(&self, declared: Rect) -> Rect {
        let implicit_w = self.text.chars().count() as f32 * self.font_size * GLYPH_ADVANCE;
        let implicit_h = self.font_size * 1.2;
        Rect::new(
            declared.x,
            declared.y,
            if declared.width > 0.0 { declared.width } else { implicit_w },
            if declared.height > 0.0 { declared.height } else { implicit_h },
        )
    }
}

impl Paintable for TextItem {
    fn paint(&self, _geometry: Rect, material: &Material, surface: &mut PaintSurface) {
        if self.text.is_empty() {
            return;
        }
        let mut color = material.color;
        color[3] *= material.opacity;
        surface.glyphs(
            Vec2::new(0.0, self.font_size),
            Arc::clone(&self.text),
            self.font_size,
            color,
        );
    }
}

/// A textured quad referencing an external image source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageItem {
    pub source: Option<Arc<str>>,
}

impl Geometrical for ImageItem {
    fn calculate_geometry(&self, declared: Rect) -> Rect {
        declared
    }
}

impl Paintable for ImageItem {
    fn paint(&self, geometry: Rect, material: &Material, surface: &mut PaintSurface) {
        let Some(source) = &self.source else { return };
        if geometry.is_empty() {
            return;
        }
        surface.blit(
            Rect::new(0.0, 0.0, geometry.width, geometry.height),
            Arc::clone(source),
            material.opacity,
        );
    }
}

/// The registered item kinds, dispatched without boxing.
#[enum_dispatch(Geometrical, Paintable)]
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Rect(RectItem),
    Text(TextItem),
    Image(ImageItem),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_paints_premultiplied_opacity() {
        let material = Material {
            color: [1.0, 0.0, 0.0, 1.0],
            opacity: 0.5,
            source: None,
        };
        let mut surface = PaintSurface::new();
        RectItem.paint(Rect::new(0.0, 0.0, 10.0, 10.0), &material, &mut surface);
        let ops = surface.finish();
        assert_eq!(ops.len(), 1);
        let PaintOp::FillRect { color, .. } = &ops[0] else {
            panic!("expected fill");
        };
        assert_eq!(color[3], 0.5);
    }

    #[test]
    fn empty_rect_paints_nothing() {
        let mut surface = PaintSurface::new();
        RectItem.paint(Rect::default(), &Material::default(), &mut surface);
        assert!(surface.finish().is_empty());
    }

    #[test]
    fn text_implicit_size_respects_declared() {
        let item = TextItem {
            text: Arc::<str>::from("hello"),
            font_size: 10.0,
        };
        let implicit = item.calculate_geometry(Rect::default());
        assert!((implicit.width - 30.0).abs() < 1e-3);
        assert!((implicit.height - 12.0).abs() < 1e-3);

        let declared = item.calculate_geometry(Rect::new(0.0, 0.0, 100.0, 20.0));
        assert_eq!(declared.width, 100.0);
    }

    #[test]
    fn item_kind_dispatches() {
        let kind = ItemKind::Text(TextItem {
            text: Arc::<str>::from("ab"),
            font_size: 10.0,
        });
        let rect = kind.calculate_geometry(Rect::default());
        assert!(rect.width > 0.0);
        let mut surface = PaintSurface::new();
        kind.paint(rect, &Material::default(), &mut surface);
        assert_eq!(surface.finish().len(), 1);
    }

    #[test]
    fn image_without_source_paints_nothing() {
        let mut surface = PaintSurface::new();
        ImageItem::default().paint(
            Rect::new(0.0, 0.0, 5.0, 5.0),
            &Material::default(),
            &mut surface,
        );
        assert!(surface.finish().is_empty());
    }
}
