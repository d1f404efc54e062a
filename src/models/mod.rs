// Domain models: cluster inventory, assistant results, session records

mod chat;
mod cluster;
mod session;

pub use chat::{
    ChatRole, ChatTurn, Citation, FlowDetails, FlowDocument, FoundationModelInfo,
    InferenceParams, InvocationResult, ResponseMode, ResponseType, RetrievalHit,
};
pub use cluster::{
    ClusterDetail, ClusterSummary, ComputeOverview, ContainerRecord, NodeCapacity, NodeRecord,
    NodeStatus, NodegroupSummary, PodPhase, PodRecord, ResourceAmounts, TotalCapacity,
};
pub use session::SessionRecord;
