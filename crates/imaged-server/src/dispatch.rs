//! Request dispatch: one protocol request in, one reply out.
//!
//! Every request maps onto a single store operation. Store errors become
//! [`ImagedMessage::Error`] replies with a code from [`codes`]; nothing is
//! retried here.

use imaged_image::{ImageMeta, ImageView, ImageViewMut, Pixel, SampleType};
use imaged_protocol::{codes, EntryInfo, ImagedMessage, ProtocolError, PROTOCOL_VERSION};
use imaged_store::{Store, StoreError};
use tracing::{debug, warn};

/// A request that could not be served.
#[derive(Debug)]
struct Rejection {
    code: u32,
    message: String,
}

impl Rejection {
    fn new(code: u32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<StoreError> for Rejection {
    fn from(err: StoreError) -> Self {
        Self::new(error_code(&err), err.to_string())
    }
}

/// Wire error code for a store error.
pub fn error_code(err: &StoreError) -> u32 {
    match err {
        StoreError::KeyNotFound(_) => codes::NOT_FOUND,
        StoreError::KeyExists(_) => codes::CONFLICT,
        StoreError::LockConflict(_) => codes::LOCKED,
        StoreError::InvalidKey(_) | StoreError::InvalidMetadata(_) | StoreError::ReadOnly(_) => {
            codes::BAD_REQUEST
        }
        StoreError::Image(_) => codes::UNSUPPORTED,
        StoreError::Closed | StoreError::Busy(_) => codes::UNAVAILABLE,
        StoreError::CannotOpenStore { .. } | StoreError::CorruptEntry { .. } | StoreError::Io(_) => {
            codes::INTERNAL
        }
    }
}

pub fn entry_info(key: &str, meta: &ImageMeta) -> EntryInfo {
    EntryInfo {
        key: key.to_string(),
        width: meta.width,
        height: meta.height,
        channels: meta.channels,
        color: meta.color.name().to_string(),
        ty: meta.ty.name().to_string(),
    }
}

/// Serve one request against `store`. Blocks on file I/O.
pub fn dispatch(store: &Store, request: ImagedMessage) -> ImagedMessage {
    let name = request.type_name();
    match serve(store, request) {
        Ok(reply) => reply,
        Err(Rejection { code, message }) => {
            debug!(request = name, code, %message, "request rejected");
            ImagedMessage::error(code, message)
        }
    }
}

fn serve(store: &Store, request: ImagedMessage) -> Result<ImagedMessage, Rejection> {
    match request {
        ImagedMessage::Hello { version } => {
            if version != PROTOCOL_VERSION {
                let err = ProtocolError::VersionMismatch { local: PROTOCOL_VERSION, remote: version };
                return Err(Rejection::new(codes::BAD_REQUEST, err.to_string()));
            }
            Ok(ImagedMessage::HelloAck {
                version: PROTOCOL_VERSION,
                server: format!("imaged/{}", env!("CARGO_PKG_VERSION")),
            })
        }
        ImagedMessage::Set { key, width, height, channels, ty } => {
            let ty = SampleType::parse(&ty)
                .ok_or_else(|| Rejection::new(codes::BAD_REQUEST, format!("unknown sample type: {ty}")))?;
            let meta = ImageMeta::new(width, height, channels, ty);
            store.create(&key, meta, None)?.release()?;
            Ok(ImagedMessage::Ok)
        }
        ImagedMessage::GetMeta { key } => {
            let handle = store.get(&key, false)?;
            Ok(ImagedMessage::Meta(entry_info(&key, handle.meta())))
        }
        ImagedMessage::List => {
            let mut it = store.iter()?;
            let mut entries = Vec::new();
            while it.next() {
                if let Some((key, view)) = it.current() {
                    entries.push(entry_info(key, view.meta()));
                }
            }
            Ok(ImagedMessage::Listing { entries })
        }
        ImagedMessage::Remove { key } => {
            store.remove(&key)?;
            Ok(ImagedMessage::Ok)
        }
        ImagedMessage::RemoveAll => remove_all(store),
        ImagedMessage::GetPixel { key, x, y } => {
            let handle = store.get(&key, false)?;
            let px = handle.view().pixel(x, y).ok_or_else(|| out_of_range(handle.meta(), x, y))?;
            Ok(ImagedMessage::Pixel { data: px.data })
        }
        ImagedMessage::SetPixel { key, x, y, components } => {
            let data = ImagedMessage::rgba_from_components(&components).ok_or_else(|| {
                Rejection::new(
                    codes::BAD_REQUEST,
                    format!("expected 1, 3 or 4 components, got {}", components.len()),
                )
            })?;
            let mut handle = store.get(&key, true)?;
            if !handle.meta().in_bounds(x, y) {
                return Err(out_of_range(handle.meta(), x, y));
            }
            handle.view_mut()?.set_pixel(x, y, &Pixel { data });
            handle.release()?;
            Ok(ImagedMessage::Ok)
        }
        ImagedMessage::Export { key, format } => {
            let format = format.to_ascii_lowercase();
            let data = store.get(&key, false)?.encode(&format)?;
            Ok(ImagedMessage::Exported { format, data })
        }
        reply => Err(Rejection::new(
            codes::BAD_REQUEST,
            format!("not a request: {}", reply.type_name()),
        )),
    }
}

/// Remove every entry. Locked keys are skipped and keys removed
/// concurrently are ignored.
fn remove_all(store: &Store) -> Result<ImagedMessage, Rejection> {
    let mut count = 0u64;
    for key in store.keys()? {
        match store.remove(&key) {
            Ok(()) => count += 1,
            Err(StoreError::LockConflict(_)) => warn!(key, "locked entry kept"),
            Err(StoreError::KeyNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(ImagedMessage::Removed { count })
}

fn out_of_range(meta: &ImageMeta, x: u64, y: u64) -> Rejection {
    Rejection::new(
        codes::OUT_OF_RANGE,
        format!("pixel ({x}, {y}) outside {}x{}", meta.width, meta.height),
    )
}
