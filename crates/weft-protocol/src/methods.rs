// Well-known WS method and event names.

// topicAnalysis (C6/C7)
pub const TOPIC_ANALYSIS_GET_KEYWORDS: &str = "topicAnalysis:getKeywords";
pub const TOPIC_ANALYSIS_GET_SUBJECTS: &str = "topicAnalysis:getSubjects";
pub const TOPIC_ANALYSIS_GET_SUMMARIES: &str = "topicAnalysis:getSummaries";
pub const TOPIC_ANALYSIS_EXTRACT_REALTIME_KEYWORDS: &str = "topicAnalysis:extractRealtimeKeywords";

// proposals (C9)
pub const PROPOSALS_GET_FOR_TOPIC: &str = "proposals:getForTopic";
pub const PROPOSALS_DISMISS: &str = "proposals:dismiss";
pub const PROPOSALS_SHARE: &str = "proposals:share";

// chat (C8)
pub const CHAT_SEND_MESSAGE: &str = "chat:sendMessage";
pub const CHAT_STOP_STREAMING: &str = "chat:stopStreaming";

// Events (server push)
pub const EVENT_KEYWORDS_UPDATED: &str = "keywords:updated";
pub const EVENT_SUBJECTS_UPDATED: &str = "subjects:updated";
pub const EVENT_PROPOSALS_UPDATED: &str = "proposals:updated";
pub const EVENT_MESSAGE_STREAM: &str = "message:stream";
pub const EVENT_MESSAGE_UPDATED: &str = "message:updated";
pub const EVENT_AI_ERROR: &str = "ai:error";
