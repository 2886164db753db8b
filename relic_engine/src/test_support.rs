//! Synthetic movie images for unit tests.

const IMAGE_HEADER: usize = 28;

pub fn chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// `width` x `height` image filled with `colour`: one fill command per 4x4
/// block, all sharing a single pixel byte per block.
pub fn fill_image(width: u16, height: u16, colour: u8) -> Vec<u8> {
    let blocks_x = (width as usize).div_ceil(4);
    let blocks_y = (height as usize).div_ceil(4);
    let line_size = (blocks_x * 2).div_ceil(8);
    let cmd_offset = IMAGE_HEADER;
    let pixel_offset = cmd_offset + line_size * blocks_y;
    let mask_offset = pixel_offset + blocks_x * blocks_y;

    let mut data = vec![0u8; IMAGE_HEADER];
    data[6..8].copy_from_slice(&8u16.to_le_bytes());
    data[8..10].copy_from_slice(&width.to_le_bytes());
    data[10..12].copy_from_slice(&height.to_le_bytes());
    data[12..14].copy_from_slice(&(cmd_offset as u16).to_le_bytes());
    data[16..18].copy_from_slice(&(pixel_offset as u16).to_le_bytes());
    data[20..22].copy_from_slice(&(mask_offset as u16).to_le_bytes());
    data[24..26].copy_from_slice(&(line_size as u16).to_le_bytes());
    data.resize(pixel_offset, 0);
    data.resize(mask_offset, colour);
    data
}

pub fn frame(audio: Option<&[u8]>, palette: Option<&[u8]>, image: Option<&[u8]>) -> Vec<u8> {
    fn place(slot: usize, sub: Option<&[u8]>, payload: &mut Vec<u8>) {
        if let Some(sub) = sub {
            let offset = payload.len() as u32 + 8;
            payload[slot..slot + 4].copy_from_slice(&offset.to_le_bytes());
            payload.extend_from_slice(sub);
        }
    }

    let mut payload = vec![0u8; 20];
    place(8, audio, &mut payload);
    place(12, image, &mut payload);
    place(16, palette, &mut payload);
    chunk(b"MFRM", &payload)
}

pub fn palette_packet(runs: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; 4];
    data.extend_from_slice(&(runs.len() as u32).to_le_bytes());
    data.extend_from_slice(runs);
    data
}

/// One raw-coded audio chunk.
pub fn raw_audio(samples: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; 4];
    data.extend_from_slice(&(samples.len() as u16).to_le_bytes());
    data.extend_from_slice(&1u16.to_le_bytes());
    data.push(0x05);
    data.extend_from_slice(samples);
    data
}

pub fn movie(frame_delay: u16, frames: &[Vec<u8>]) -> Vec<u8> {
    let mut header = Vec::new();
    header.extend_from_slice(&frame_delay.to_le_bytes());
    header.extend_from_slice(&[0; 4]);
    header.extend_from_slice(&(frames.len() as u16).to_le_bytes());
    header.extend_from_slice(&[0; 4]);
    header.extend_from_slice(&22050u16.to_le_bytes());
    header.extend_from_slice(&[0; 44]);
    header.extend_from_slice(&[0; 768]);

    let mut data = chunk(b"MOVE", &[]);
    data.extend(chunk(b"MHED", &header));
    for f in frames {
        data.extend_from_slice(f);
    }
    data
}
