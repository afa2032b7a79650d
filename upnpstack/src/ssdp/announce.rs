use std::net::SocketAddr;

use tracing::debug;

use super::{SsdpError, SsdpMessage, SsdpTransport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnouncementKind {
    Alive,
    /// `ssdp:update`, announcing the next boot id
    Update { next_bootid: u32 },
    ByeBye,
    /// Unicast answer to an M-SEARCH
    SearchResult { target: SocketAddr },
}

/// One USN announcement, ready to be framed.
///
/// For a search result `nt` carries the matched search target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub kind: AnnouncementKind,
    pub nt: String,
    pub usn: String,
    pub location: String,
    pub max_age: u32,
    pub bootid: u32,
    pub configid: u32,
    pub search_port: Option<u16>,
}

impl Announcement {
    pub fn to_message(&self) -> SsdpMessage {
        let message = match &self.kind {
            AnnouncementKind::Alive => self
                .with_location(SsdpMessage::notify().header("NT", &self.nt))
                .header("NTS", "ssdp:alive"),
            AnnouncementKind::Update { next_bootid } => self
                .with_location(SsdpMessage::notify().header("NT", &self.nt))
                .header("NTS", "ssdp:update")
                .header("NEXTBOOTID.UPNP.ORG", next_bootid),
            AnnouncementKind::ByeBye => SsdpMessage::notify()
                .header("NT", &self.nt)
                .header("NTS", "ssdp:byebye"),
            AnnouncementKind::SearchResult { .. } => {
                let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
                self.with_location(
                    SsdpMessage::response()
                        .header("DATE", date)
                        .header("EXT", ""),
                )
                .header("ST", &self.nt)
            }
        };

        let mut message = message
            .header("USN", &self.usn)
            .header("BOOTID.UPNP.ORG", self.bootid)
            .header("CONFIGID.UPNP.ORG", self.configid);
        if let Some(port) = self.search_port
            && self.kind != AnnouncementKind::ByeBye
        {
            message = message.header("SEARCHPORT.UPNP.ORG", port);
        }
        message
    }

    fn with_location(&self, message: SsdpMessage) -> SsdpMessage {
        message
            .header("CACHE-CONTROL", format!("max-age={}", self.max_age))
            .header("LOCATION", &self.location)
    }

    /// Multicasts a notification or unicasts a search result.
    pub fn send(&self, transport: &dyn SsdpTransport) -> Result<(), SsdpError> {
        let message = self.to_message();
        match &self.kind {
            AnnouncementKind::SearchResult { target } => {
                debug!(usn = %self.usn, "search result to {} (ST={})", target, self.nt);
                transport.unicast(&message, *target)
            }
            kind => {
                debug!(usn = %self.usn, "NOTIFY {:?} (NT={})", kind, self.nt);
                transport.multicast(&message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announcement(kind: AnnouncementKind) -> Announcement {
        Announcement {
            kind,
            nt: "upnp:rootdevice".to_string(),
            usn: "uuid:1::upnp:rootdevice".to_string(),
            location: "http://h/desc".to_string(),
            max_age: 1800,
            bootid: 3,
            configid: 9,
            search_port: None,
        }
    }

    #[test]
    fn test_alive_headers() {
        let msg = announcement(AnnouncementKind::Alive).to_message();
        assert!(msg.is_notify());
        assert_eq!(msg.nts(), Some("ssdp:alive"));
        assert_eq!(msg.max_age(), 1800);
        assert_eq!(msg.location(), Some("http://h/desc"));
        assert_eq!(msg.bootid(), Some(3));
        assert_eq!(msg.configid(), Some(9));
    }

    #[test]
    fn test_update_and_byebye_headers() {
        let update = announcement(AnnouncementKind::Update { next_bootid: 4 }).to_message();
        assert_eq!(update.nts(), Some("ssdp:update"));
        assert_eq!(update.next_bootid(), Some(4));

        let byebye = announcement(AnnouncementKind::ByeBye).to_message();
        assert_eq!(byebye.nts(), Some("ssdp:byebye"));
        assert_eq!(byebye.location(), None);
        assert_eq!(byebye.get("CACHE-CONTROL"), None);
    }

    #[test]
    fn test_search_result_headers() {
        let target = "10.0.0.5:50000".parse().unwrap();
        let msg = announcement(AnnouncementKind::SearchResult { target }).to_message();
        assert!(msg.is_response());
        assert_eq!(msg.st(), Some("upnp:rootdevice"));
        assert_eq!(msg.get("EXT"), Some(""));
        assert!(msg.get("DATE").is_some());
        assert!(msg.request_bytes().is_err());
    }
}
