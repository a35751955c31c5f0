use structopt::StructOpt;

use directmq_utils::NodeId;

#[derive(StructOpt, Debug, Clone, Default)]
#[structopt(name = "directmqd", about = "DirectMQ broker node")]
pub struct Options {
    /// Config filename
    #[structopt(name = "config", short = "f", long)]
    pub cfg_name: Option<String>,

    /// Node id, overrides `node.id`
    #[structopt(name = "id", long)]
    pub node_id: Option<NodeId>,

    /// Hop limit of frames originated by this node, overrides `node.ttl`
    #[structopt(name = "ttl", long)]
    pub ttl: Option<i32>,

    /// Run as a test agent driven by JSON commands on stdin
    #[structopt(long)]
    pub agent: bool,
}
