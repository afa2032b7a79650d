use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use quick_xml::escape::escape;
use tracing::{debug, info};

use super::subscription::resolve_ips;
use super::{GenaError, Subscription, parse_callbacks};
use crate::http::{HttpClient, HttpRequest};
use crate::tasks::{Runnable, TaskQueue, TimerThread};

/// State change of an evented service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenaEvent {
    pub usn: String,
    /// `(variable, wire value)` pairs
    pub properties: Vec<(String, String)>,
    pub moderated_interval: Duration,
    pub moderated_delta: u32,
}

impl GenaEvent {
    pub fn new(usn: &str, properties: Vec<(String, String)>) -> Self {
        Self {
            usn: usn.to_string(),
            properties,
            moderated_interval: Duration::ZERO,
            moderated_delta: 0,
        }
    }

    pub fn moderated(mut self, interval: Duration, delta: u32) -> Self {
        self.moderated_interval = interval;
        self.moderated_delta = delta;
        self
    }
}

/// An approved `NOTIFY` for one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub sid: String,
    pub seq: u32,
    pub callbacks: Vec<String>,
    pub body: String,
}

impl Delivery {
    /// Posts the event to each callback in turn until one accepts it.
    pub fn send(&self, http: &dyn HttpClient) -> Result<(), GenaError> {
        let mut last_error = String::from("no callback");
        for callback in &self.callbacks {
            let request = HttpRequest::new("NOTIFY", callback)
                .header("Content-Type", r#"text/xml; charset="utf-8""#)
                .header("NT", "upnp:event")
                .header("NTS", "upnp:propchange")
                .header("SID", &self.sid)
                .header("SEQ", &self.seq.to_string())
                .body(self.body.clone().into_bytes());
            match http.request(request) {
                Ok(response) if response.is_success() => {
                    debug!(sid = %self.sid, seq = self.seq, "event delivered to {}", callback);
                    return Ok(());
                }
                Ok(response) => last_error = format!("{} answered {}", callback, response.status),
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(GenaError::Delivery {
            sid: self.sid.clone(),
            reason: last_error,
        })
    }
}

/// `e:propertyset` body of a GENA `NOTIFY`.
pub fn property_set(properties: &[(String, String)]) -> String {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="utf-8"?>"#,
    );
    body.push_str(r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">"#);
    for (name, value) in properties {
        body.push_str(&format!(
            "<e:property><{name}>{}</{name}></e:property>",
            escape(value.as_str()),
            name = name
        ));
    }
    body.push_str("</e:propertyset>");
    body
}

#[derive(Default)]
struct GenaState {
    /// usn -> sid -> subscription
    subscriptions: HashMap<String, HashMap<String, Subscription>>,
    timeouts: TaskQueue<(String, String)>,
}

impl GenaState {
    /// Drops a subscription and its timeout entry.
    fn remove(&mut self, usn: &str, sid: &str) -> bool {
        self.timeouts.remove_where(|(u, s)| u == usn && s == sid);
        let Some(subs) = self.subscriptions.get_mut(usn) else {
            return false;
        };
        let removed = subs.remove(sid).is_some();
        if subs.is_empty() {
            self.subscriptions.remove(usn);
        }
        removed
    }
}

/// Subscription registry with its timeout timer.
pub struct Gena {
    state: Mutex<GenaState>,
    timer: Mutex<Option<TimerThread>>,
    default_timeout: u32,
    max_timeout: u32,
}

impl Gena {
    pub fn new(default_timeout: u32, max_timeout: u32) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GenaState::default()),
            timer: Mutex::new(None),
            default_timeout: default_timeout.max(1),
            max_timeout: max_timeout.max(default_timeout).max(1),
        })
    }

    /// Starts the timeout timer; no-op when already running.
    pub fn start(self: &Arc<Self>) -> std::io::Result<()> {
        let mut timer = self.timer.lock();
        if timer.is_none() {
            let weak: Weak<dyn Runnable> = Arc::downgrade(self) as Weak<dyn Runnable>;
            *timer = Some(TimerThread::start("gena-timer", weak)?);
            info!("✅ GENA manager started");
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.timer.lock().is_some()
    }

    /// Stops the timer and forgets every subscription.
    pub fn stop(&self) {
        let timer = self.timer.lock().take();
        if let Some(timer) = timer {
            timer.stop();
            let mut state = self.state.lock();
            state.subscriptions.clear();
            state.timeouts.clear();
            info!("GENA manager stopped");
        }
    }

    fn wake(&self) {
        if let Some(timer) = self.timer.lock().as_ref() {
            timer.wake();
        }
    }

    fn clamp_timeout(&self, timeout: Option<u32>) -> u32 {
        timeout
            .unwrap_or(self.default_timeout)
            .clamp(1, self.max_timeout)
    }

    /// Creates (or replaces) the subscription for the callbacks of `callback_header`.
    ///
    /// Returns the subscription with its granted timeout.
    pub fn register(
        &self,
        usn: &str,
        callback_header: &str,
        timeout: Option<u32>,
        variables: Option<Vec<String>>,
    ) -> Result<Subscription, GenaError> {
        let callbacks = parse_callbacks(callback_header)?;
        let ips = resolve_ips(&callbacks);
        let timeout = self.clamp_timeout(timeout);
        let subscription = Subscription::new(usn, callbacks, ips, timeout, variables);
        let sid = subscription.sid.clone();

        let head = {
            let mut state = self.state.lock();
            state
                .timeouts
                .remove_where(|(u, s)| u == usn && *s == sid);
            state
                .subscriptions
                .entry(usn.to_string())
                .or_default()
                .insert(sid.clone(), subscription.clone());
            state.timeouts.add(
                Instant::now() + Duration::from_secs(timeout as u64),
                (usn.to_string(), sid.clone()),
            )
        };
        if head {
            self.wake();
        }

        info!(usn = %usn, sid = %sid, "subscription registered for {}s", timeout);
        Ok(subscription)
    }

    /// Renews a subscription; returns the granted timeout.
    pub fn reregister(&self, usn: &str, sid: &str, timeout: Option<u32>) -> Result<u32, GenaError> {
        let timeout = self.clamp_timeout(timeout);
        let head = {
            let mut state = self.state.lock();
            let subscription = state
                .subscriptions
                .get_mut(usn)
                .and_then(|subs| subs.get_mut(sid))
                .ok_or_else(|| GenaError::UnknownSubscription(sid.to_string()))?;
            subscription.timeout = timeout;

            state.timeouts.remove_where(|(u, s)| u == usn && s == sid);
            state.timeouts.add(
                Instant::now() + Duration::from_secs(timeout as u64),
                (usn.to_string(), sid.to_string()),
            )
        };
        if head {
            self.wake();
        }
        debug!(usn = %usn, sid = %sid, "subscription renewed for {}s", timeout);
        Ok(timeout)
    }

    pub fn deregister(&self, usn: &str, sid: &str) -> Result<(), GenaError> {
        let removed = self.state.lock().remove(usn, sid);
        if removed {
            info!(usn = %usn, sid = %sid, "subscription removed");
            Ok(())
        } else {
            Err(GenaError::UnknownSubscription(sid.to_string()))
        }
    }

    /// Drops every subscription whose callbacks resolve to `ip`, for one
    /// service (`usn`) or for all of them.
    pub fn cancel(&self, usn: Option<&str>, ip: IpAddr) -> usize {
        let targets: Vec<(String, String)> = {
            let state = self.state.lock();
            state
                .subscriptions
                .iter()
                .filter(|(u, _)| usn.is_none_or(|wanted| wanted == u.as_str()))
                .flat_map(|(u, subs)| {
                    subs.values()
                        .filter(|s| s.ips.contains(&ip))
                        .map(move |s| (u.clone(), s.sid.clone()))
                })
                .collect()
        };
        for (usn, sid) in &targets {
            let _ = self.deregister(usn, sid);
        }
        if !targets.is_empty() {
            debug!("cancelled {} subscriptions of {}", targets.len(), ip);
        }
        targets.len()
    }

    pub fn subscription(&self, usn: &str, sid: &str) -> Option<Subscription> {
        self.state
            .lock()
            .subscriptions
            .get(usn)
            .and_then(|subs| subs.get(sid))
            .cloned()
    }

    pub fn subscription_count(&self) -> usize {
        self.state
            .lock()
            .subscriptions
            .values()
            .map(HashMap::len)
            .sum()
    }

    /// Approves `event` for every subscriber of its service.
    pub fn prepare_deliveries(&self, event: &GenaEvent) -> Vec<Delivery> {
        let touched: Vec<&str> = event.properties.iter().map(|(n, _)| n.as_str()).collect();
        let now = Instant::now();
        let mut state = self.state.lock();
        let Some(subs) = state.subscriptions.get_mut(&event.usn) else {
            return Vec::new();
        };

        let mut deliveries = Vec::new();
        for subscription in subs.values_mut() {
            let Some(seq) = subscription.approve_seq_for_event(
                &touched,
                event.moderated_interval,
                event.moderated_delta,
                now,
            ) else {
                continue;
            };
            let properties: Vec<(String, String)> = match &subscription.variables {
                Some(filter) => event
                    .properties
                    .iter()
                    .filter(|(n, _)| filter.contains(n))
                    .cloned()
                    .collect(),
                None => event.properties.clone(),
            };
            deliveries.push(Delivery {
                sid: subscription.sid.clone(),
                seq,
                callbacks: subscription.callbacks.clone(),
                body: property_set(&properties),
            });
        }
        deliveries
    }

    /// Initial event of a new subscriber, always `SEQ: 0`.
    pub fn initial_delivery(subscription: &Subscription, properties: &[(String, String)]) -> Delivery {
        Delivery {
            sid: subscription.sid.clone(),
            seq: 0,
            callbacks: subscription.callbacks.clone(),
            body: property_set(properties),
        }
    }
}

impl Gena {
    /// Removes the subscription whose timeout is due at `now`, if any, and
    /// returns the next timeout.
    ///
    /// The pop and the removal share one lock: a renewal is either seen
    /// before the pop (and moved the entry) or refused afterwards.
    pub fn expire_due(&self, now: Instant) -> Option<Instant> {
        let mut state = self.state.lock();
        if let Some((usn, sid)) = state.timeouts.pop_due(now) {
            if state.remove(&usn, &sid) {
                info!(usn = %usn, sid = %sid, "subscription expired");
            } else {
                debug!(sid = %sid, "expired subscription was already gone");
            }
        }
        state.timeouts.next_timestamp()
    }
}

impl Runnable for Gena {
    fn run(&self) -> Option<Instant> {
        self.expire_due(Instant::now())
    }
}
