use std::collections::HashSet;
use std::io::Cursor;

use image::{Rgba, RgbaImage};

use crate::error::CaptureError;

/// Open Graph 预览图尺寸
pub const OG_IMAGE_WIDTH: u32 = 600;
pub const OG_IMAGE_HEIGHT: u32 = 314;

/// 顶部背景行保留上限：超过该行数的单色区域会被裁掉
const MAX_TOP_MARGIN: i64 = 25;

/// 把渲染结果裁剪为 600x314 预览图。
///
/// `voffset` 为主机配置的裁剪起始行。启发式分三步：
/// 1. 从 voffset 起统计与首像素同色的整行数（浏览器 chrome / 页头背景），
///    超过 25 行的部分下移裁剪窗口；
/// 2. 紧接其后再统计一段"自成一色"的色带（如 hero banner），同样下移；
/// 3. 在接下来的 50 行内测量内容的左右留白，把顶部留白压到与其对齐。
///
/// 图片高度不足 `voffset + 314` 时返回 `CropFailure`。
pub fn crop_image(m: &RgbaImage, conf_voffset: i64) -> Result<RgbaImage, CaptureError> {
    let mut voffset = conf_voffset.max(0);

    let (top_margin, bg_color) = count_single_colored_rows(m, voffset);
    let (orig_top_margin, orig_voffset) = (top_margin, voffset);
    let mut top_margin = top_margin;
    if top_margin > MAX_TOP_MARGIN {
        voffset += top_margin - MAX_TOP_MARGIN;
        top_margin = MAX_TOP_MARGIN;
    }

    let mut sep = "";
    let (diff_colored_margin, _) = count_single_colored_rows(m, orig_voffset + orig_top_margin);
    if diff_colored_margin > MAX_TOP_MARGIN {
        voffset += diff_colored_margin - MAX_TOP_MARGIN;
        top_margin = MAX_TOP_MARGIN;
        sep = " (~c)";
    }

    tracing::debug!(
        "vo: {orig_voffset} -> {voffset}{sep}, tm: {orig_top_margin} -> {top_margin}"
    );
    let orig_voffset = voffset;

    // 在 [voffset, voffset+50) 的条带里找内容列的左右留白，
    // 用较小的一侧压低顶部留白，使裁剪窗口贴住可见内容。
    let (left_margin, right_margin) =
        left_right_margins(m, voffset, voffset + MAX_TOP_MARGIN * 2, bg_color);

    let mut max_margin = if right_margin > left_margin || right_margin == 0 {
        left_margin
    } else {
        right_margin
    };
    if max_margin > 0 && max_margin < MAX_TOP_MARGIN {
        max_margin += (MAX_TOP_MARGIN - max_margin) / 2;
    }
    tracing::debug!("mm: {left_margin}/{right_margin} -> {max_margin}");

    if max_margin < top_margin {
        voffset += top_margin - max_margin;
    }
    if orig_voffset != voffset {
        tracing::debug!("vo: {orig_voffset} -> {voffset}");
    }

    if voffset + OG_IMAGE_HEIGHT as i64 > m.height() as i64 {
        return Err(CaptureError::CropFailure);
    }
    Ok(image::imageops::crop_imm(m, 0, voffset as u32, OG_IMAGE_WIDTH, OG_IMAGE_HEIGHT).to_image())
}

/// 从 `offset` 行起，统计整行都等于该行首像素颜色的连续行数。
/// 返回 (行数, 参照色)。offset 越界时返回 (0, 透明)。
fn count_single_colored_rows(m: &RgbaImage, offset: i64) -> (i64, Rgba<u8>) {
    let (w, h) = (m.width() as i64, m.height() as i64);
    if offset < 0 || offset >= h || w == 0 {
        return (0, Rgba([0, 0, 0, 0]));
    }
    let bg_color = *m.get_pixel(0, offset as u32);
    let mut count = 0;
    for y in offset..h {
        for x in 0..w {
            if *m.get_pixel(x as u32, y as u32) != bg_color {
                return (count, bg_color);
            }
        }
        count += 1;
    }
    (count, bg_color)
}

/// 在 [top, bottom) 条带内测量内容相对 `bg_color` 的左右留白。
/// 两侧留白同时为 0 时提前退出。
fn left_right_margins(m: &RgbaImage, top: i64, bottom: i64, bg_color: Rgba<u8>) -> (i64, i64) {
    let (w, h) = (m.width() as i64, m.height() as i64);
    let top = top.clamp(0, h);
    let bottom = bottom.clamp(0, h);
    let (mut min_left, mut max_right) = (w - 1, 0);

    for y in top..bottom {
        for x in 0..w {
            if *m.get_pixel(x as u32, y as u32) == bg_color {
                continue;
            }
            if x < min_left {
                min_left = x;
            }
            break;
        }
        for x in (0..w).rev() {
            if *m.get_pixel(x as u32, y as u32) == bg_color {
                continue;
            }
            if x > max_right {
                max_right = x;
            }
            break;
        }
        if min_left == 0 && max_right == w - 1 {
            break;
        }
    }
    (min_left, w - max_right - 1)
}

/// 图片信息密度分值：按 4x4 步长采样像素，取不同颜色数减一。
/// 纯色 / 空白截图得 0 分；merge 的密度保护只依赖该值的单调性。
pub fn image_score(m: &RgbaImage) -> i32 {
    let mut colors: HashSet<[u8; 4]> = HashSet::new();
    for y in (0..m.height()).step_by(4) {
        for x in (0..m.width()).step_by(4) {
            colors.insert(m.get_pixel(x, y).0);
        }
    }
    (colors.len() as i32 - 1).max(0)
}

/// PNG 编码
pub fn encode_png(m: &RgbaImage) -> Result<Vec<u8>, CaptureError> {
    let mut buf = Cursor::new(Vec::new());
    m.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}

/// 启动期的全透明占位 PNG（兜底图加载成功前的替身）。
pub fn encode_empty_png(width: u32, height: u32) -> Vec<u8> {
    encode_png(&RgbaImage::new(width, height)).expect("encode empty PNG")
}
