//! Multi-application scenarios against the shell core
//!
//! Applications are stood in for by real child processes so the liveness
//! monitor watches genuine process ids; their messages are fed to the
//! server directly.

use lintel::channel::{Message, MenuNode, ProcessId, StatusHandle, StatusItemPayload};
use lintel::config::{BarConfig, ShellConfig};
use lintel::shell::{
    BarPresenter, LivenessMonitor, PixmapPresenter, SessionEndpoint, ShellError, ShellServer,
};
use std::process::{Child, Command};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

struct App {
    child: Child,
    inbox: UnboundedReceiver<Message>,
}

impl App {
    fn start(server: &mut ShellServer, monitor: &mut LivenessMonitor) -> Self {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let (endpoint, inbox) = SessionEndpoint::channel();
        let pid = ProcessId(child.id());
        server.open_session(pid, endpoint).unwrap();
        monitor.watch(pid);
        Self { child, inbox }
    }

    fn pid(&self) -> ProcessId {
        ProcessId(self.child.id())
    }

    fn kill(&mut self) {
        self.child.kill().unwrap();
        self.child.wait().unwrap();
    }

    fn notices(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(message) = self.inbox.try_recv() {
            out.push(message);
        }
        out
    }
}

impl Drop for App {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn setup() -> (ShellServer, LivenessMonitor) {
    let config = ShellConfig {
        liveness_poll_ms: 20,
        ..ShellConfig::default()
    };
    (ShellServer::new(&config), LivenessMonitor::new(config.liveness_poll()))
}

fn two_item_menu() -> MenuNode {
    MenuNode::new("Mail").with_children([MenuNode::new("File"), MenuNode::new("Mailbox")])
}

#[tokio::test]
async fn test_killed_app_vanishes_from_the_bar() {
    let (mut server, mut monitor) = setup();

    let mut a = App::start(&mut server, &mut monitor);
    server.handle_message(a.pid(), Message::RegisterMenu(two_item_menu())).unwrap();
    server
        .handle_message(
            a.pid(),
            Message::RegisterStatusItem {
                handle: StatusHandle(7),
                payload: StatusItemPayload::titled("Inbox"),
            },
        )
        .unwrap();

    let mut b = App::start(&mut server, &mut monitor);
    server
        .handle_message(b.pid(), Message::RegisterMenu(MenuNode::new("Notes").with_child(MenuNode::new("File"))))
        .unwrap();

    let frame = server.render();
    let menu = frame.app_menu.as_ref().unwrap();
    assert_eq!(menu.owner, a.pid());
    assert_eq!(menu.titles.len(), 2);
    assert_eq!(frame.tray_keys(), vec![(a.pid(), StatusHandle(7))]);
    assert_eq!(a.notices(), vec![Message::Activate(true)]);
    assert!(b.notices().is_empty());

    a.kill();
    let dead = timeout(Duration::from_secs(5), monitor.next_death())
        .await
        .expect("liveness monitor never reported the death");
    assert_eq!(dead, a.pid());
    assert!(server.reap(dead));

    let frame = server.render();
    assert!(!frame.mentions(a.pid()));
    assert!(frame.app_menu.is_none());
    assert!(frame.tray.is_empty());
    assert_eq!(server.active(), None);

    // Late traffic from the dead process changes nothing
    let stray = server.handle_message(dead, Message::RegisterMenu(two_item_menu()));
    assert_eq!(stray, Err(ShellError::UnknownSession(dead)));
    assert!(!server.render().mentions(dead));
}

#[tokio::test]
async fn test_tray_click_switches_active_app() {
    let (mut server, mut monitor) = setup();
    let mut a = App::start(&mut server, &mut monitor);
    let mut b = App::start(&mut server, &mut monitor);

    server.handle_message(a.pid(), Message::RegisterMenu(two_item_menu())).unwrap();
    server
        .handle_message(
            b.pid(),
            Message::RegisterStatusItem {
                handle: StatusHandle(3),
                payload: StatusItemPayload::titled("Notes").with_icon("notes"),
            },
        )
        .unwrap();
    a.notices();

    // Hit-test the rendered bar like a pointer click would
    let mut presenter = PixmapPresenter::new(&BarConfig::default()).unwrap();
    presenter.present(&server.render()).unwrap();
    let (rect, owner, handle) = presenter.layout().unwrap().tray[0];
    let hit = presenter.tray_item_at(rect.x + rect.width / 2.0, rect.y + rect.height / 2.0);
    assert_eq!(hit, Some((owner, handle)));

    server.status_item_clicked(owner, handle).unwrap();
    assert_eq!(server.active(), Some(b.pid()));
    assert_eq!(a.notices(), vec![Message::Activate(false)]);
    assert_eq!(b.notices(), vec![Message::Activate(true)]);

    // B has no menu, so the bar shows none
    assert!(server.render().app_menu.is_none());
}
