use crate::config::Config;
use crate::error::Result;
use crate::link::Links;
use crate::storage::{read_circular, BufferMemory, Direction};
use crate::table::{RxSarApp, SessionId};
use super::{AppResponse, Received, RxRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Idle,
    Listen(u16),
    Read { session: SessionId, max_len: usize },
}

/// Listens, reads and notifications of the application.
#[derive(Debug)]
pub struct RxAppInterface {
    buffer_size: usize,
    pending: Pending,
}

impl RxAppInterface {
    pub fn new(config: &Config) -> Self {
        RxAppInterface {
            buffer_size: config.buffer_size,
            pending: Pending::Idle,
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.pending == Pending::Idle
    }

    pub(crate) fn poll<M: BufferMemory + ?Sized>(&mut self, links: &Links, memory: &M) -> Result<()> {
        if let Some(notification) = links.rx_notify.pop() {
            links.app_notify.push(notification)?;
        }
        if let Some(notification) = links.timer_notify.pop() {
            links.app_notify.push(notification)?;
        }

        self.pending = match self.pending {
            Pending::Idle if !(links.listen_req.has_room(1) && links.rx_sar_app_req.has_room(1)) => Pending::Idle,
            Pending::Idle => match links.app_rx_req.pop() {
                Some(RxRequest::Listen(port)) => {
                    links.listen_req.push(port)?;
                    Pending::Listen(port)
                },
                Some(RxRequest::Receive { session, max_len }) => {
                    links.rx_sar_app_req.push(RxSarApp::Read(session))?;
                    Pending::Read { session, max_len }
                },
                None => Pending::Idle,
            },
            Pending::Listen(port) => match links.listen_rsp.pop() {
                Some(ok) => {
                    links.app_rsp.push(AppResponse::Listen { port, ok })?;
                    Pending::Idle
                },
                None => Pending::Listen(port),
            },
            Pending::Read { session, max_len } if !links.rx_sar_app_req.has_room(1) => {
                Pending::Read { session, max_len }
            },
            Pending::Read { session, max_len } => match links.rx_sar_app_rsp.pop() {
                Some(entry) => {
                    let len = entry.available().min(max_len);
                    let mut data = vec![0; len];
                    if len > 0 {
                        read_circular(memory, Direction::Rx, session, entry.appd, self.buffer_size, &mut data)?;
                        links.rx_sar_app_req.push(RxSarApp::Consume(session, entry.appd + len))?;
                    }
                    net_trace!("session {}: application read {} bytes", session, len);
                    links.app_data.push(Received { session, data })?;
                    Pending::Idle
                },
                None => Pending::Read { session, max_len },
            },
        };

        Ok(())
    }
}
