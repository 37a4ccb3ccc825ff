//! Transport seam
//!
//! The dispatcher consumes a half-duplex byte link through this trait. Opening
//! and closing the link is the owner's business; the dispatcher only moves
//! bytes while it holds a session.

use super::ProtocolError;

/// Byte-level link to the mount
pub trait Transport: Send {
    /// Write a framed command to the link
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), ProtocolError>;

    /// Block until `terminator` arrives or the link's receive bound expires
    ///
    /// Returns the bytes read including the terminator. Expiry must surface as
    /// [`ProtocolError::TransportTimeout`]; any other failure as a fatal error.
    fn receive_until(&mut self, terminator: u8) -> Result<Vec<u8>, ProtocolError>;

    /// Discard unread input and unsent output
    fn clear_buffers(&mut self) -> Result<(), ProtocolError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        (**self).transmit(bytes)
    }

    fn receive_until(&mut self, terminator: u8) -> Result<Vec<u8>, ProtocolError> {
        (**self).receive_until(terminator)
    }

    fn clear_buffers(&mut self) -> Result<(), ProtocolError> {
        (**self).clear_buffers()
    }
}
