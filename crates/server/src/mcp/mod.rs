pub mod quest_server;
