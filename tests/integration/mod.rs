/****************** Routing ******************/
mod aodv;
mod link_break;

/****************** Platform *****************/
mod node_cli;
