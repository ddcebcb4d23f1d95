//! In-memory Slack workspace for tests and local dry runs.
//!
//! Behaves like the Web API where reconciliation cares: names are unique
//! across archived channels, topics and purposes come back HTML-escaped, the
//! creator joins its own channel, and archived channels reject mutations.
//! Every call is recorded so tests can assert which writes happened.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use huddle_core::membership::Member;
use huddle_core::normalize::{normalize_email, observed_matches};
use huddle_core::{ChannelId, MemberId};

use crate::{ChannelInfo, SlackError, SlackResult, SlackService};

/// Identity the mock acts as; joins every channel it creates.
pub const BOT_ID: &str = "U023BECGF";
pub const EXISTING_USER_ID: &str = "W012A3CDE";
pub const EXISTING_USER_EMAIL: &str = "iamuser@slack.com";
pub const NAME_TAKEN: &str = "name-taken";

/// Methods that change Slack state.
pub const WRITE_METHODS: &[&str] = &[
    "conversations.create",
    "conversations.rename",
    "conversations.setTopic",
    "conversations.setPurpose",
    "conversations.invite",
    "conversations.kick",
    "conversations.archive",
    "conversations.unarchive",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub method: &'static str,
    pub args: Vec<String>,
}

impl Call {
    pub fn is_write(&self) -> bool {
        WRITE_METHODS.contains(&self.method)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockChannel {
    pub info: ChannelInfo,
    pub members: BTreeSet<MemberId>,
}

#[derive(Default)]
struct State {
    channels: BTreeMap<ChannelId, MockChannel>,
    users: BTreeMap<MemberId, Member>,
    next_id: u64,
    calls: Vec<Call>,
    failures: HashMap<&'static str, VecDeque<SlackError>>,
}

impl State {
    fn record(&mut self, method: &'static str, args: &[&str]) -> SlackResult<()> {
        self.calls.push(Call { method, args: args.iter().map(|s| s.to_string()).collect() });
        match self.failures.get_mut(method).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn channel_mut(&mut self, id: &str) -> SlackResult<&mut MockChannel> {
        self.channels.get_mut(id).ok_or(SlackError::ChannelNotFound)
    }

    fn live_channel_mut(&mut self, id: &str) -> SlackResult<&mut MockChannel> {
        let ch = self.channel_mut(id)?;
        if ch.info.is_archived {
            return Err(SlackError::Api("is_archived".into()));
        }
        Ok(ch)
    }

    fn name_in_use(&self, name: &str, except: Option<&str>) -> bool {
        self.channels.values().any(|c| observed_matches(&c.info.name, name) && Some(c.info.id.as_str()) != except)
    }

    fn insert_channel(&mut self, name: &str, is_private: bool) -> ChannelId {
        self.next_id += 1;
        let id = format!("C{:08}", self.next_id);
        let info = ChannelInfo { id: id.clone(), name: name.to_string(), is_private, ..Default::default() };
        let members = BTreeSet::from([BOT_ID.to_string()]);
        self.channels.insert(id.clone(), MockChannel { info, members });
        id
    }
}

/// Slack escapes these three in topics and purposes.
fn slack_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub struct MockSlack {
    state: Mutex<State>,
}

impl Default for MockSlack {
    fn default() -> Self { Self::new() }
}

impl MockSlack {
    /// Workspace with the bot and one regular user.
    pub fn new() -> Self {
        let me = Self { state: Mutex::new(State::default()) };
        me.add_user(Member::bot(BOT_ID));
        me.add_user(Member::user(EXISTING_USER_ID, EXISTING_USER_EMAIL));
        me
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_user(&self, member: Member) {
        self.lock().users.insert(member.id.clone(), member);
    }

    /// Seed a channel that exists before the controller ever runs.
    pub fn add_channel(&self, name: &str, is_private: bool, is_archived: bool) -> ChannelId {
        let mut st = self.lock();
        let id = st.insert_channel(name, is_private);
        if let Some(ch) = st.channels.get_mut(&id) {
            ch.info.is_archived = is_archived;
        }
        id
    }

    pub fn add_member(&self, channel: &str, user: &str) {
        if let Some(ch) = self.lock().channels.get_mut(channel) {
            ch.members.insert(user.to_string());
        }
    }

    /// Drop a channel as if an admin deleted it.
    pub fn delete_channel(&self, channel: &str) {
        self.lock().channels.remove(channel);
    }

    pub fn channel(&self, id: &str) -> Option<MockChannel> {
        self.lock().channels.get(id).cloned()
    }

    pub fn channel_by_name(&self, name: &str) -> Option<MockChannel> {
        self.lock().channels.values().find(|c| observed_matches(&c.info.name, name)).cloned()
    }

    /// Make the next call to `method` fail with `err`. Queues stack.
    pub fn fail_next(&self, method: &'static str, err: SlackError) {
        self.lock().failures.entry(method).or_default().push_back(err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.lock().calls.iter().filter(|c| c.is_write()).cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

#[async_trait::async_trait]
impl SlackService for MockSlack {
    async fn create_channel(&self, name: &str, is_private: bool) -> SlackResult<ChannelId> {
        let mut st = self.lock();
        st.record("conversations.create", &[name, if is_private { "true" } else { "false" }])?;
        if st.name_in_use(name, None) {
            return Err(SlackError::NameTaken);
        }
        Ok(st.insert_channel(name, is_private))
    }

    async fn channel_info(&self, channel: &str) -> SlackResult<ChannelInfo> {
        let mut st = self.lock();
        st.record("conversations.info", &[channel])?;
        Ok(st.channel_mut(channel)?.info.clone())
    }

    async fn find_channel_by_name(&self, name: &str) -> SlackResult<Option<ChannelInfo>> {
        let mut st = self.lock();
        st.record("conversations.list", &[name])?;
        Ok(st.channels.values().find(|c| observed_matches(&c.info.name, name)).map(|c| c.info.clone()))
    }

    async fn rename_channel(&self, channel: &str, name: &str) -> SlackResult<()> {
        let mut st = self.lock();
        st.record("conversations.rename", &[channel, name])?;
        st.live_channel_mut(channel)?;
        if st.name_in_use(name, Some(channel)) {
            return Err(SlackError::NameTaken);
        }
        st.live_channel_mut(channel)?.info.name = name.to_string();
        Ok(())
    }

    async fn set_topic(&self, channel: &str, topic: &str) -> SlackResult<()> {
        let mut st = self.lock();
        st.record("conversations.setTopic", &[channel, topic])?;
        st.live_channel_mut(channel)?.info.topic = slack_escape(topic);
        Ok(())
    }

    async fn set_description(&self, channel: &str, description: &str) -> SlackResult<()> {
        let mut st = self.lock();
        st.record("conversations.setPurpose", &[channel, description])?;
        st.live_channel_mut(channel)?.info.description = slack_escape(description);
        Ok(())
    }

    async fn list_members(&self, channel: &str) -> SlackResult<Vec<MemberId>> {
        let mut st = self.lock();
        st.record("conversations.members", &[channel])?;
        Ok(st.channel_mut(channel)?.members.iter().cloned().collect())
    }

    async fn lookup_user_by_email(&self, email: &str) -> SlackResult<Member> {
        let mut st = self.lock();
        st.record("users.lookupByEmail", &[email])?;
        let wanted = normalize_email(email);
        st.users
            .values()
            .find(|u| u.email.as_deref().map(normalize_email).as_deref() == Some(wanted.as_str()))
            .cloned()
            .ok_or_else(|| SlackError::UserNotFound(email.to_string()))
    }

    async fn user_info(&self, user: &str) -> SlackResult<Member> {
        let mut st = self.lock();
        st.record("users.info", &[user])?;
        st.users.get(user).cloned().ok_or_else(|| SlackError::UserNotFound(user.to_string()))
    }

    async fn invite(&self, channel: &str, user: &str) -> SlackResult<()> {
        let mut st = self.lock();
        st.record("conversations.invite", &[channel, user])?;
        if !st.users.contains_key(user) {
            return Err(SlackError::UserNotFound(user.to_string()));
        }
        st.live_channel_mut(channel)?.members.insert(user.to_string());
        Ok(())
    }

    async fn remove(&self, channel: &str, user: &str) -> SlackResult<()> {
        let mut st = self.lock();
        st.record("conversations.kick", &[channel, user])?;
        st.live_channel_mut(channel)?.members.remove(user);
        Ok(())
    }

    async fn archive(&self, channel: &str) -> SlackResult<()> {
        let mut st = self.lock();
        st.record("conversations.archive", &[channel])?;
        let ch = st.channel_mut(channel)?;
        if ch.info.is_archived {
            return Err(SlackError::AlreadyArchived);
        }
        ch.info.is_archived = true;
        Ok(())
    }

    async fn unarchive(&self, channel: &str) -> SlackResult<()> {
        let mut st = self.lock();
        st.record("conversations.unarchive", &[channel])?;
        st.channel_mut(channel)?.info.is_archived = false;
        Ok(())
    }
}
