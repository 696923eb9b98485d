mod broadcasts;
mod config;
mod packet;
