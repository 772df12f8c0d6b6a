use super::{Command, Status, SENTINEL};
use crate::layout::Clip;

/// Client to server messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Image bytes for one row
    Image { row: u32 },
    /// Tag alias list
    TagList,
    /// Apply `values` to every row in `[begin, end]` (inclusive)
    SetTags {
        begin: u32,
        end: u32,
        values: Vec<bool>,
    },
    /// Persist the label matrix to disk
    Save,
    /// Clip layout
    ClipLayout,
    /// Projected row table
    RowTable,
}

impl Request {
    pub fn command(&self) -> Command {
        match self {
            Request::Image { .. } => Command::Image,
            Request::TagList => Command::TagList,
            Request::SetTags { .. } => Command::SetTags,
            Request::Save => Command::Save,
            Request::ClipLayout => Command::ClipLayout,
            Request::RowTable => Command::RowTable,
        }
    }

    /// Complete frame bytes, sentinel included
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![SENTINEL, self.command().as_byte()];
        match self {
            Request::Image { row } => put_u32(&mut buf, *row),
            Request::SetTags { begin, end, values } => {
                put_u32(&mut buf, *begin);
                put_u32(&mut buf, *end);
                put_u32(&mut buf, values.len() as u32);
                buf.extend(values.iter().map(|v| u8::from(*v)));
            }
            Request::TagList | Request::Save | Request::ClipLayout | Request::RowTable => {}
        }
        buf
    }
}

/// Server to client messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Image bytes for a row
    ImageData { row: u32, bytes: Vec<u8> },
    /// Image for a row could not be read
    ImageError { row: u32, message: String },
    /// Alias per label column, in column order
    TagList { status: Status, aliases: Vec<String> },
    /// Outcome of a tag mutation
    SetTags { status: Status },
    /// Outcome of a persist request
    Save { status: Status },
    /// Clip ranges with their view counts
    ClipLayout { status: Status, clips: Vec<Clip> },
    /// CSV text of the projected row table
    RowTable { status: Status, table: String },
}

impl Response {
    pub fn command(&self) -> Command {
        match self {
            Response::ImageData { .. } | Response::ImageError { .. } => Command::Image,
            Response::TagList { .. } => Command::TagList,
            Response::SetTags { .. } => Command::SetTags,
            Response::Save { .. } => Command::Save,
            Response::ClipLayout { .. } => Command::ClipLayout,
            Response::RowTable { .. } => Command::RowTable,
        }
    }

    /// Complete frame bytes, sentinel included
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.encode_header();
        match self {
            Response::ImageData { bytes, .. } => buf.extend_from_slice(bytes),
            Response::ImageError { message, .. } => buf.extend_from_slice(message.as_bytes()),
            Response::TagList { aliases, .. } => {
                for alias in aliases {
                    put_bytes(&mut buf, alias.as_bytes());
                }
            }
            Response::ClipLayout { status, clips } => {
                if status.is_ok() {
                    for clip in clips {
                        put_u32(&mut buf, clip.begin);
                        put_u32(&mut buf, clip.end);
                        put_u32(&mut buf, clip.view_count);
                    }
                }
            }
            Response::RowTable { table, .. } => buf.extend_from_slice(table.as_bytes()),
            Response::SetTags { .. } | Response::Save { .. } => {}
        }
        buf
    }

    /// Frame bytes up to and including the first length or count field
    ///
    /// For image responses this is everything before the payload, which lets
    /// the writer stream the payload in chunks without copying it.
    pub(super) fn encode_header(&self) -> Vec<u8> {
        let mut buf = vec![SENTINEL, self.command().as_byte()];
        match self {
            Response::ImageData { row, bytes } => {
                buf.push(Status::Ok.as_byte());
                put_u32(&mut buf, *row);
                put_u32(&mut buf, bytes.len() as u32);
            }
            Response::ImageError { row, message } => {
                buf.push(Status::Failed.as_byte());
                put_u32(&mut buf, *row);
                put_u32(&mut buf, message.len() as u32);
            }
            Response::TagList { status, aliases } => {
                buf.push(status.as_byte());
                put_u32(&mut buf, aliases.len() as u32);
            }
            Response::SetTags { status } | Response::Save { status } => {
                buf.push(status.as_byte());
            }
            Response::ClipLayout { status, clips } => {
                buf.push(status.as_byte());
                if status.is_ok() {
                    put_u32(&mut buf, clips.len() as u32);
                }
            }
            Response::RowTable { status, table } => {
                buf.push(status.as_byte());
                put_u32(&mut buf, table.len() as u32);
            }
        }
        buf
    }
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_tags_layout() {
        let frame = Request::SetTags {
            begin: 2,
            end: 5,
            values: vec![false, true],
        }
        .encode();
        assert_eq!(
            frame,
            vec![0xFF, 0x03, 0, 0, 0, 2, 0, 0, 0, 5, 0, 0, 0, 2, 0, 1]
        );
    }

    #[test]
    fn test_image_request_is_big_endian() {
        assert_eq!(
            Request::Image { row: 0x0102_0304 }.encode(),
            vec![0xFF, 0x01, 0x01, 0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn test_image_error_layout() {
        let frame = Response::ImageError {
            row: 7,
            message: "nope".to_string(),
        }
        .encode();
        assert_eq!(&frame[..3], &[0xFF, 0x01, 0x01]);
        assert_eq!(&frame[3..7], &7u32.to_be_bytes());
        assert_eq!(&frame[7..11], &4u32.to_be_bytes());
        assert_eq!(&frame[11..], b"nope");
    }

    #[test]
    fn test_failed_clip_layout_is_status_only() {
        let frame = Response::ClipLayout {
            status: Status::Failed,
            clips: Vec::new(),
        }
        .encode();
        assert_eq!(frame, vec![0xFF, 0x05, 0x01]);
    }

    #[test]
    fn test_tag_list_layout() {
        let frame = Response::TagList {
            status: Status::Ok,
            aliases: vec!["cat".to_string()],
        }
        .encode();
        assert_eq!(
            frame,
            vec![0xFF, 0x02, 0x00, 0, 0, 0, 1, 0, 0, 0, 3, b'c', b'a', b't']
        );
    }
}
